//! Storage and messaging adapters.

pub mod events;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use events::{EventPublisher, NatsPublisher, NoopPublisher, PublishError, RecordingPublisher};
pub use memory::InMemoryRepository;
pub use postgres::PgRepository;
pub use repository::{Guarded, ShopRepository};
