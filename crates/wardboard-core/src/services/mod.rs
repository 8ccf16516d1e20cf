//! Service layer shared across clients

mod ward;

pub use ward::{DashboardSummary, DischargeForm, NewPatient, WardService};
