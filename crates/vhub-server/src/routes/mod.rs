pub mod health;
pub mod publish;
pub mod ws;
