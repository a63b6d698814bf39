pub mod payment_coordinator;
pub mod poller;

pub use payment_coordinator::{PaymentConfirmationCoordinator, WebhookReceiver};
pub use poller::{OperationPoller, OperationStream, PollPolicy};
