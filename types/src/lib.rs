pub mod containers;
pub mod genesis;
pub mod params;
pub mod primitives;
