use std::sync::Arc;

use crate::desk::Desk;

pub struct Data {
    pub desk: Arc<Desk>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;

pub type Context<'a> = poise::Context<'a, Data, Error>;
