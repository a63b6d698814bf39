use crate::models::diagnosis::ImagePayload;
use crate::models::operation::OperationKind;
use crate::models::payment::PaymentRequest;

/// 创建任务所需的输入，按操作类型区分
#[derive(Debug, Clone)]
pub enum OperationInput {
    Diagnosis(ImagePayload),
    Payment(PaymentRequest),
}

impl OperationInput {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationInput::Diagnosis(_) => OperationKind::Diagnosis,
            OperationInput::Payment(_) => OperationKind::Payment,
        }
    }
}

impl From<ImagePayload> for OperationInput {
    fn from(image: ImagePayload) -> Self {
        OperationInput::Diagnosis(image)
    }
}

impl From<PaymentRequest> for OperationInput {
    fn from(request: PaymentRequest) -> Self {
        OperationInput::Payment(request)
    }
}
