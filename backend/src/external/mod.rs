//! External collaborator integrations

pub mod documents;
pub mod email;
pub mod payment;
pub mod qr;

pub use documents::{DocumentMetadata, DocumentStore, FsDocumentStore, NewDocument, StoredDocument};
pub use email::{EmailMessage, HttpEmailGateway, LogOnlyGateway, NotificationGateway};
pub use payment::{
    HttpPaymentVerifier, PaymentVerification, PaymentVerifier, UnconfiguredPaymentVerifier,
};
pub use qr::{QrRenderer, UrlQrRenderer};
