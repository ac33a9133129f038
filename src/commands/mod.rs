pub mod dashboard;
pub mod employees;
pub mod invoices;
pub mod projects;
pub mod shifts;
pub mod suppliers;
pub mod tasks;
pub mod training;
