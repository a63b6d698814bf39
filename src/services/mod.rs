pub mod result_interpreter;
pub mod submitter;

pub use result_interpreter::ResultInterpreter;
pub use submitter::OperationSubmitter;
