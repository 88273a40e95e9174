pub mod guild_config;
pub mod license_key;
pub mod premium;
pub mod reviews;
pub mod snowflake;
pub mod ticket;
pub mod time_parse;
