pub mod agent;
pub mod convert;
pub mod extract;
pub mod ocr;
pub mod processor;
pub mod telegram;
