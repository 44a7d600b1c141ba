pub mod cost;
pub mod router;
pub mod weights;
