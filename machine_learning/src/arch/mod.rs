pub mod activations;
pub mod layers;
pub mod loss;
mod model;
mod net;
mod sequential;

pub use model::Model;
pub use net::NetConfig;
pub use sequential::Sequential;
