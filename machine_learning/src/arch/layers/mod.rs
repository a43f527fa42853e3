mod conv2d;
mod dense;
mod dropout;
mod flatten;
mod layer;
mod log_softmax;
mod max_pool;

use ndarray::ArrayD;

pub use conv2d::Conv2d;
pub use dense::Dense;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use layer::Layer;
pub use log_softmax::LogSoftmax;
pub use max_pool::MaxPool2d;

/// Returns `x` in row major order, copying only if it is not already.
fn standard_layout(x: ArrayD<f32>) -> ArrayD<f32> {
    if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    }
}
