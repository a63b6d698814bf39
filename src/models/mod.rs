pub mod diagnosis;
pub mod input;
pub mod loaders;
pub mod operation;
pub mod payment;
pub mod status;

pub use diagnosis::{DiagnosisResult, ImagePayload, Recommendations, RecommendedProduct, Severity};
pub use input::OperationInput;
pub use loaders::load_config;
pub use operation::{
    InvalidTransition, Operation, OperationId, OperationKind, OperationResult, OperationState,
    PollVerdict, ResubmitPolicy,
};
pub use payment::{PaymentOutcome, PaymentReceipt, PaymentRequest, Transaction, WebhookConfirmation};
pub use status::{JobStatus, StatusResponse};
