mod inmemory;

pub use inmemory::InMemoryProvider;
