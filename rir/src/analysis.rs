pub mod cfg_tree;
pub use cfg_tree::*;
pub mod def_use;
pub use def_use::*;
pub mod dominator;
pub use dominator::*;
pub mod fixpoint;
pub use fixpoint::*;
pub mod loops;
pub use loops::*;
pub mod origin;
pub use origin::*;
pub mod post_order;
pub use post_order::*;
pub mod provenance;
pub use provenance::*;
