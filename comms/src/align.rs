// Primitive number types usable as raw receive buffers.
pub trait Align1: bytemuck::Pod {}

impl Align1 for u8 {}
impl Align1 for u32 {}
impl Align1 for u64 {}
impl Align1 for f32 {}

// Receive buffers whose start is aligned to at least 4 bytes, so that a payload placed after
// the 4 byte message header can be viewed as `f32`/`u32` in place.
pub trait Align4: Align1 {}

impl Align4 for u32 {}
impl Align4 for u64 {}
impl Align4 for f32 {}
