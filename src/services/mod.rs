pub mod locations;

pub use locations::LocationSearchService;
