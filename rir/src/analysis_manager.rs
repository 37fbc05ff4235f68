use std::{
    any::{type_name, TypeId},
    cell::RefCell,
    rc::Rc,
};

use downcast_rs::{impl_downcast, Downcast};
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::{
    create_cfg_tree_analysis, create_def_use_analysis, create_dominators_analysis,
    create_loops_analysis, create_origins_analysis, create_postorder_analysis,
    create_provenance_analysis, create_provenance_report_analysis, Cfg, Context, Deduplicated,
    FxIndexMap, IrError, ProvenanceReporter, Unit,
};

/// Result of an analysis. Specific result must be downcasted to.
pub trait AnalysisResultT: Downcast {}
impl_downcast!(AnalysisResultT);
pub type AnalysisResult = Box<dyn AnalysisResultT>;

/// Builds a whole-unit analysis.  Dependencies are already built when this runs and are
/// fetched through the [`Analyses`] argument.
pub type UnitAnalysisFn = fn(&Context, Unit, &Analyses) -> Result<AnalysisResult, IrError>;
/// Builds an analysis of one CFG.
pub type CfgAnalysisFn = fn(&Context, Cfg, &Analyses) -> Result<AnalysisResult, IrError>;

/// Program scope over which an analysis is computed.
pub enum AnalysisScope {
    Unit(UnitAnalysisFn),
    Cfg(CfgAnalysisFn),
}

impl AnalysisScope {
    fn describe(&self) -> &'static str {
        match self {
            AnalysisScope::Unit(_) => "unit",
            AnalysisScope::Cfg(_) => "CFG",
        }
    }
}

pub struct Analysis {
    pub name: &'static str,
    pub descr: &'static str,
    /// Names of the analyses this one needs, built in this order before it.
    pub deps: Vec<&'static str>,
    pub runner: AnalysisScope,
    result_type: TypeId,
    result_type_name: &'static str,
}

impl Analysis {
    /// Declare a unit-scoped analysis producing a `T`.
    pub fn unit<T: AnalysisResultT>(
        name: &'static str,
        descr: &'static str,
        deps: Vec<&'static str>,
        runner: UnitAnalysisFn,
    ) -> Analysis {
        Analysis {
            name,
            descr,
            deps,
            runner: AnalysisScope::Unit(runner),
            result_type: TypeId::of::<T>(),
            result_type_name: type_name::<T>(),
        }
    }

    /// Declare a per-CFG analysis producing a `T`.
    pub fn cfg<T: AnalysisResultT>(
        name: &'static str,
        descr: &'static str,
        deps: Vec<&'static str>,
        runner: CfgAnalysisFn,
    ) -> Analysis {
        Analysis {
            name,
            descr,
            deps,
            runner: AnalysisScope::Cfg(runner),
            result_type: TypeId::of::<T>(),
            result_type_name: type_name::<T>(),
        }
    }

    pub fn is_unit_scoped(&self) -> bool {
        matches!(self.runner, AnalysisScope::Unit(_))
    }
}

/// The closed set of analyses an optimizer may ask for.
#[derive(Default)]
pub struct AnalysisRegistry {
    analyses: FxIndexMap<&'static str, Analysis>,
}

impl AnalysisRegistry {
    /// Register an analysis. Should be called only once for each analysis.
    pub fn register(&mut self, analysis: Analysis) -> &'static str {
        let name = analysis.name;
        if self.analyses.contains_key(name) {
            panic!("Trying to register an already registered analysis");
        }
        self.analyses.insert(name, analysis);
        name
    }

    /// Is `name` a registered analysis?
    pub fn is_registered(&self, name: &str) -> bool {
        self.analyses.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Analysis> {
        self.analyses.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.analyses.keys().copied()
    }

    pub fn help_text(&self) -> String {
        let summary = self
            .analyses
            .iter()
            .map(|(name, analysis)| format!("  {name:20} - {}", analysis.descr))
            .join("\n");

        format!("Valid analysis names are:\n\n{summary}",)
    }
}

pub fn register_known_analyses(registry: &mut AnalysisRegistry) {
    registry.register(create_cfg_tree_analysis());
    registry.register(create_postorder_analysis());
    registry.register(create_dominators_analysis());
    registry.register(create_loops_analysis());
    registry.register(create_def_use_analysis());
    registry.register(create_origins_analysis());
    registry.register(create_provenance_analysis());
    registry.register(create_provenance_report_analysis());
}

/// Configuration naming the analyses active for an [`Analyses`] instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysesConfig {
    pub active: Vec<String>,
}

impl AnalysesConfig {
    pub fn new<S: ToString>(names: &[S]) -> AnalysesConfig {
        AnalysesConfig {
            active: names.iter().map(ToString::to_string).collect(),
        }
    }

    /// Every analysis of `registry`.
    pub fn all(registry: &AnalysisRegistry) -> AnalysesConfig {
        AnalysesConfig {
            active: registry.names().map(str::to_owned).collect(),
        }
    }

    /// `names` together with their transitive dependencies, dependencies first.
    pub fn with_dependencies<S: AsRef<str>>(
        registry: &AnalysisRegistry,
        names: &[S],
    ) -> Result<AnalysesConfig, IrError> {
        fn visit(
            registry: &AnalysisRegistry,
            name: &str,
            active: &mut Vec<String>,
        ) -> Result<(), IrError> {
            if active.iter().any(|n| n == name) {
                return Ok(());
            }
            let analysis = registry
                .get(name)
                .ok_or_else(|| IrError::UnknownAnalysis(name.to_owned()))?;
            for dep in &analysis.deps {
                visit(registry, dep, active)?;
            }
            active.push(name.to_owned());
            Ok(())
        }

        let mut active = Vec::new();
        for name in names {
            visit(registry, name.as_ref(), &mut active)?;
        }
        Ok(AnalysesConfig { active })
    }
}

/// Lazily computed, memoized analyses of one compilation unit.
///
/// Every analysis is built at most once, on first request, after its dependencies.  Per-CFG
/// analyses are cached for each CFG of the unit separately, including nested promise bodies.
/// The IR must not change while an `Analyses` is alive.
pub struct Analyses<'a> {
    context: &'a Context,
    unit: Unit,
    active: FxIndexMap<&'static str, &'a Analysis>,
    by_type: FxHashMap<TypeId, &'static str>,
    unit_results: RefCell<FxHashMap<&'static str, Rc<dyn AnalysisResultT>>>,
    cfg_results: RefCell<FxHashMap<(Cfg, &'static str), Rc<dyn AnalysisResultT>>>,
    in_progress: RefCell<FxHashSet<(Option<Cfg>, &'static str)>>,
    reporter: Option<RefCell<Deduplicated<Box<dyn ProvenanceReporter + 'a>>>>,
}

impl<'a> Analyses<'a> {
    /// Create the analyses of `unit`, restricted to the analyses `config` activates.
    ///
    /// Fails if an active analysis is not registered or depends on an inactive one.
    pub fn new(
        context: &'a Context,
        registry: &'a AnalysisRegistry,
        unit: Unit,
        config: &AnalysesConfig,
    ) -> Result<Analyses<'a>, IrError> {
        let mut active = FxIndexMap::default();
        for name in &config.active {
            let analysis = registry
                .get(name)
                .ok_or_else(|| IrError::UnknownAnalysis(name.clone()))?;
            active.insert(analysis.name, analysis);
        }

        for analysis in active.values() {
            for dep in &analysis.deps {
                let Some(dep_analysis) = active.get(dep) else {
                    return Err(IrError::MissingAnalysisDependency {
                        analysis: analysis.name.to_owned(),
                        dependency: (*dep).to_owned(),
                    });
                };
                if analysis.is_unit_scoped() && !dep_analysis.is_unit_scoped() {
                    return Err(IrError::UnitAnalysisDependsOnCfg {
                        analysis: analysis.name.to_owned(),
                        dependency: (*dep).to_owned(),
                    });
                }
            }
        }

        let by_type = active
            .values()
            .map(|analysis| (analysis.result_type, analysis.name))
            .collect();

        Ok(Analyses {
            context,
            unit,
            active,
            by_type,
            unit_results: RefCell::default(),
            cfg_results: RefCell::default(),
            in_progress: RefCell::default(),
            reporter: None,
        })
    }

    /// Inject the reporter receiving provenance violations found by analyses built later.  Each
    /// distinct violation reaches it once, however many analyses find it.
    pub fn with_reporter(mut self, reporter: Box<dyn ProvenanceReporter + 'a>) -> Analyses<'a> {
        self.reporter = Some(RefCell::new(Deduplicated::new(reporter)));
        self
    }

    pub fn get_context(&self) -> &'a Context {
        self.context
    }

    pub fn get_unit(&self) -> Unit {
        self.unit
    }

    /// Is the analysis `name` active?
    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    /// Get a unit-scoped analysis, building it (and its dependencies) on first request.
    /// Example: `analyses.get::<CfgTree>()`.
    pub fn get<T: AnalysisResultT>(&self) -> Result<Rc<T>, IrError> {
        let name = self.name_of::<T>()?;
        let result = self.resolve_unit(name)?;
        Self::downcast(name, result)
    }

    /// Get an analysis of `cfg`, building it (and its dependencies) on first request.
    /// Example: `analyses.get_cfg::<DomTree>(cfg)`.
    pub fn get_cfg<T: AnalysisResultT>(&self, cfg: Cfg) -> Result<Rc<T>, IrError> {
        if !self.unit.contains_cfg(self.context, cfg) {
            return Err(IrError::ForeignCfg(
                self.unit.get_name(self.context).to_owned(),
            ));
        }
        let name = self.name_of::<T>()?;
        let result = self.resolve_cfg(cfg, name)?;
        Self::downcast(name, result)
    }

    /// Run `f` with the injected provenance reporter, if any.
    pub(crate) fn with_reporter_mut<R>(
        &self,
        f: impl FnOnce(Option<&mut dyn ProvenanceReporter>) -> R,
    ) -> R {
        match &self.reporter {
            Some(reporter) => {
                let mut reporter = reporter.borrow_mut();
                f(Some(&mut *reporter))
            }
            None => f(None),
        }
    }

    fn name_of<T: AnalysisResultT>(&self) -> Result<&'static str, IrError> {
        self.by_type
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or_else(|| IrError::AnalysisNotRegistered(type_name::<T>().to_owned()))
    }

    fn downcast<T: AnalysisResultT>(
        name: &'static str,
        result: Rc<dyn AnalysisResultT>,
    ) -> Result<Rc<T>, IrError> {
        result
            .downcast_rc::<T>()
            .map_err(|_| IrError::AnalysisResultMismatch {
                analysis: name.to_owned(),
            })
    }

    fn resolve_unit(&self, name: &'static str) -> Result<Rc<dyn AnalysisResultT>, IrError> {
        if let Some(result) = self.unit_results.borrow().get(name) {
            return Ok(result.clone());
        }

        let analysis = self.active[name];
        let AnalysisScope::Unit(runner) = analysis.runner else {
            return Err(IrError::AnalysisScopeMismatch {
                analysis: name.to_owned(),
                actual: analysis.runner.describe(),
                requested: "unit",
            });
        };

        let result = self.build(None, analysis, |analyses| {
            runner(analyses.context, analyses.unit, analyses)
        })?;
        self.unit_results.borrow_mut().insert(name, result.clone());
        Ok(result)
    }

    fn resolve_cfg(
        &self,
        cfg: Cfg,
        name: &'static str,
    ) -> Result<Rc<dyn AnalysisResultT>, IrError> {
        if let Some(result) = self.cfg_results.borrow().get(&(cfg, name)) {
            return Ok(result.clone());
        }

        let analysis = self.active[name];
        let AnalysisScope::Cfg(runner) = analysis.runner else {
            return Err(IrError::AnalysisScopeMismatch {
                analysis: name.to_owned(),
                actual: analysis.runner.describe(),
                requested: "CFG",
            });
        };

        let result = self.build(Some(cfg), analysis, |analyses| {
            runner(analyses.context, cfg, analyses)
        })?;
        self.cfg_results
            .borrow_mut()
            .insert((cfg, name), result.clone());
        Ok(result)
    }

    /// Build `analysis` after resolving its dependencies in declared order.
    fn build(
        &self,
        cfg: Option<Cfg>,
        analysis: &Analysis,
        run: impl FnOnce(&Self) -> Result<AnalysisResult, IrError>,
    ) -> Result<Rc<dyn AnalysisResultT>, IrError> {
        let key = (cfg, analysis.name);
        if !self.in_progress.borrow_mut().insert(key) {
            return Err(IrError::AnalysisDependencyCycle(analysis.name.to_owned()));
        }

        let result = analysis
            .deps
            .iter()
            .try_for_each(|dep| {
                match (&self.active[dep].runner, cfg) {
                    (AnalysisScope::Cfg(_), Some(cfg)) => self.resolve_cfg(cfg, dep),
                    _ => self.resolve_unit(dep),
                }
                .map(|_| ())
            })
            .and_then(|()| run(self));

        self.in_progress.borrow_mut().remove(&key);
        let result = result?;

        // Deref first, `Box` itself implements `Downcast`.
        if (*result).as_any().type_id() != analysis.result_type {
            return Err(IrError::AnalysisResultMismatch {
                analysis: analysis.name.to_owned(),
            });
        }
        tracing::debug!(
            analysis = analysis.name,
            result = analysis.result_type_name,
            scope = analysis.runner.describe(),
            "built analysis"
        );
        Ok(Rc::from(result))
    }
}
