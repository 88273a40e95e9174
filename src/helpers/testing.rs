//! In-memory chat platform for engine tests.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::helpers::auth::MemberInfo;
use crate::helpers::gateway::{
    ChannelInfo, ChannelKind, Gateway, GatewayError, HistoryLine, NewChannel, OutgoingMessage,
};

#[derive(Default)]
struct World {
    next_id: u64,
    channels: HashMap<u64, ChannelInfo>,
    created: Vec<NewChannel>,
    roles: BTreeSet<u64>,
    members: HashMap<u64, MemberInfo>,
    history: HashMap<u64, Vec<HistoryLine>>,
    sent: Vec<(u64, OutgoingMessage)>,
    dms: Vec<(u64, OutgoingMessage)>,
    renames: Vec<(u64, String)>,
    deleted: Vec<u64>,
    block_dms: bool,
}

#[derive(Default)]
pub struct FakeGateway {
    world: Mutex<World>,
}

impl FakeGateway {
    pub fn new() -> Self {
        let gateway = Self::default();
        gateway.world.lock().unwrap().next_id = 900000000000000000;
        gateway
    }

    pub fn add_category(&self, guild_id: u64, id: u64) {
        self.add_channel(ChannelInfo {
            id,
            guild_id,
            name: "tickets".to_string(),
            kind: ChannelKind::Category,
            parent_id: None,
            topic: None,
        });
    }

    pub fn add_channel(&self, channel: ChannelInfo) {
        self.world.lock().unwrap().channels.insert(channel.id, channel);
    }

    pub fn add_role(&self, id: u64) {
        self.world.lock().unwrap().roles.insert(id);
    }

    pub fn add_member(&self, user_id: u64, roles: &[u64]) {
        let member = MemberInfo {
            user_id,
            roles: roles.iter().copied().collect(),
            is_owner: false,
        };
        self.world.lock().unwrap().members.insert(user_id, member);
    }

    pub fn add_history(&self, channel_id: u64, lines: Vec<HistoryLine>) {
        self.world.lock().unwrap().history.insert(channel_id, lines);
    }

    pub fn block_dms(&self) {
        self.world.lock().unwrap().block_dms = true;
    }

    pub fn remove_channel(&self, channel_id: u64) {
        self.world.lock().unwrap().channels.remove(&channel_id);
    }

    pub fn channel_info(&self, channel_id: u64) -> Option<ChannelInfo> {
        self.world.lock().unwrap().channels.get(&channel_id).cloned()
    }

    pub fn created(&self) -> Vec<NewChannel> {
        self.world.lock().unwrap().created.clone()
    }

    pub fn sent_to(&self, channel_id: u64) -> Vec<OutgoingMessage> {
        let world = self.world.lock().unwrap();
        world
            .sent
            .iter()
            .filter(|(id, _)| *id == channel_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn dms(&self) -> Vec<(u64, OutgoingMessage)> {
        self.world.lock().unwrap().dms.clone()
    }

    pub fn renames(&self) -> Vec<(u64, String)> {
        self.world.lock().unwrap().renames.clone()
    }

    pub fn deleted(&self) -> Vec<u64> {
        self.world.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn channel(&self, channel_id: u64) -> Result<Option<ChannelInfo>, GatewayError> {
        Ok(self.channel_info(channel_id))
    }

    async fn guild_roles(&self, _guild_id: u64) -> Result<BTreeSet<u64>, GatewayError> {
        Ok(self.world.lock().unwrap().roles.clone())
    }

    async fn member(&self, _guild_id: u64, user_id: u64) -> Result<Option<MemberInfo>, GatewayError> {
        Ok(self.world.lock().unwrap().members.get(&user_id).cloned())
    }

    async fn create_channel(&self, guild_id: u64, channel: NewChannel) -> Result<u64, GatewayError> {
        let mut world = self.world.lock().unwrap();
        world.next_id += 1;
        let id = world.next_id;
        world.channels.insert(
            id,
            ChannelInfo {
                id,
                guild_id,
                name: channel.name.clone(),
                kind: ChannelKind::Text,
                parent_id: Some(channel.parent_id),
                topic: Some(channel.topic.clone()),
            },
        );
        world.created.push(channel);
        Ok(id)
    }

    async fn set_topic(&self, channel_id: u64, topic: &str) -> Result<(), GatewayError> {
        let mut world = self.world.lock().unwrap();
        let channel = world.channels.get_mut(&channel_id).ok_or(GatewayError::NotFound)?;
        channel.topic = Some(topic.to_string());
        Ok(())
    }

    async fn rename_channel(&self, channel_id: u64, name: &str) -> Result<(), GatewayError> {
        let mut world = self.world.lock().unwrap();
        let channel = world.channels.get_mut(&channel_id).ok_or(GatewayError::NotFound)?;
        channel.name = name.to_string();
        world.renames.push((channel_id, name.to_string()));
        Ok(())
    }

    async fn send_message(&self, channel_id: u64, message: OutgoingMessage) -> Result<(), GatewayError> {
        self.world.lock().unwrap().sent.push((channel_id, message));
        Ok(())
    }

    async fn send_dm(&self, user_id: u64, message: OutgoingMessage) -> Result<(), GatewayError> {
        let mut world = self.world.lock().unwrap();
        if world.block_dms {
            return Err(GatewayError::Platform("Cannot send messages to this user".to_string()));
        }
        world.dms.push((user_id, message));
        Ok(())
    }

    async fn recent_messages(&self, channel_id: u64, limit: usize) -> Result<Vec<HistoryLine>, GatewayError> {
        let world = self.world.lock().unwrap();
        let lines = world.history.get(&channel_id).cloned().unwrap_or_default();
        let skip = lines.len().saturating_sub(limit);
        Ok(lines.into_iter().skip(skip).collect())
    }

    async fn delete_channel(&self, channel_id: u64) -> Result<(), GatewayError> {
        let mut world = self.world.lock().unwrap();
        world.channels.remove(&channel_id);
        world.deleted.push(channel_id);
        Ok(())
    }
}
