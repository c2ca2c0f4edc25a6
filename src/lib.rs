pub mod config;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod geocode;
pub mod map;
pub mod report;
pub mod stations;
pub mod store;
pub mod web;
