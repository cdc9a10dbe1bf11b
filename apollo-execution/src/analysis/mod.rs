//! Static analysis of operations before they execute.

mod complexity;
mod traverse;

pub use complexity::DefaultFieldComplexityCalculator;
pub use complexity::FieldComplexityCalculator;
pub use complexity::MaxQueryComplexityInstrumentation;
pub use complexity::QueryComplexityInfo;
pub use traverse::QueryTraverser;
pub use traverse::QueryVisitor;
pub use traverse::QueryVisitorFieldEnvironment;
