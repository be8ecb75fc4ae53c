pub mod amount;
pub mod dispensary;
pub mod engine;
pub mod events;
pub mod inventory;
pub mod ledger;
pub mod model;

pub use amount::Amount;
pub use engine::{Engine, EngineError, LineRequest, Order};
pub use events::{BroadcastSink, Event, EventSink, NullSink};
pub use model::{OrderStatus, PaymentMethod, PaymentStatus, Principal, Role, TxnId};
