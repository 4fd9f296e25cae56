pub mod claims;
pub mod locations;
pub mod redis_store;

pub use claims::{ClaimStore, MemoryClaimStore};
pub use locations::{DeviceLocation, LocationIndex, MemoryLocationIndex};
pub use redis_store::RedisStore;
