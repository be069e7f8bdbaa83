//! Handles to the variables of the domain stores. An integer variable is a view onto a domain:
//! it either forwards the domain unaltered or applies an affine transformation.

mod affine_view;
mod domain_id;
mod graph_id;
mod integer_variable;
mod transformable_variable;

pub use affine_view::AffineView;
pub use domain_id::DomainId;
pub use graph_id::GraphId;
pub use integer_variable::IntegerVariable;
pub use transformable_variable::TransformableVariable;
