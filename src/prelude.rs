pub use crate::fit::Maximization;
pub use crate::selection::Scored;
