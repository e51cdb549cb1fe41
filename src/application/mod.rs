pub mod concierge;
pub mod deep_link;
pub mod history;
