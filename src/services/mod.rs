pub mod account_validator;
pub mod bank_sync;
pub mod fees;
pub mod refund_orchestrator;
pub mod ticketing;
pub mod webhook_reconciler;

pub use account_validator::{AccountValidator, ValidationVerdict};
pub use bank_sync::{BankSyncService, BankSyncSummary};
pub use fees::FeePolicy;
pub use refund_orchestrator::{CreateRefundRequest, CreateRefundResponse, RefundOrchestrator};
pub use ticketing::{HttpTicketingClient, NotifyResponse, TicketDetail, TicketingClient};
pub use webhook_reconciler::{ReconcileOutcome, WebhookDelivery, WebhookReconciler};
