pub mod observer;

pub use observer::ObserverModelBuilder;
