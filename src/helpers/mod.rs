pub mod auto_close;
pub mod clock;
pub mod discord;
pub mod gateway;
pub mod guild_config;
pub mod license;
pub mod premium;
pub mod reviews;
pub mod scheduler;
pub mod sqlite_store;
pub mod store;
pub mod tickets;
pub(crate) mod auth;

#[cfg(test)]
pub mod testing;
