pub mod catalog;
mod store;

pub use catalog::{CATALOG, ParameterSpec};
pub use store::{
    GameParameter, ParameterError, ParameterStore, ParameterSubscription, ParameterUpdate,
    ParameterValue,
};
