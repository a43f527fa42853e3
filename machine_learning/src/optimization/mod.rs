mod adadelta;
mod gradient_descent;
mod optimizer;
mod scheduler;

pub use adadelta::Adadelta;
pub use gradient_descent::GradientDescent;
pub use optimizer::{AnyOptimizer, Optimizer};
pub use scheduler::StepLr;
