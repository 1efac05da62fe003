//! Orchestration of provider calls behind the portal's features.

pub mod inquiries;
pub mod invoices;

pub use inquiries::{parse_inquiry_fields, InquiryFilter, InquiryService};
pub use invoices::{InvoiceLookup, InvoiceService, LOOKUP_CHAIN};
