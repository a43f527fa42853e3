/// The rectified linear unit, `max(0, x)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relu;

impl Relu {
    pub fn f(&self, x: f32) -> f32 {
        x.max(0.)
    }

    /// The derivative, taking 0 at the origin.
    pub fn df(&self, x: f32) -> f32 {
        if x > 0. { 1. } else { 0. }
    }
}
