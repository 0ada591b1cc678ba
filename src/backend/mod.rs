mod client;
mod receipts;

pub use client::{BackendClient, Method, ReqwestBackendClient};
pub use receipts::{ReceiptCallback, ReceiptReporter};
