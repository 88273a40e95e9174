use std::collections::BTreeSet;

use crate::structs::guild_config::GuildConfig;

/// What the authorization checks need to know about a guild member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberInfo {
    pub user_id: u64,
    pub roles: BTreeSet<u64>,
    pub is_owner: bool,
}

impl MemberInfo {
    fn has_any(&self, roles: &BTreeSet<u64>) -> bool {
        !self.roles.is_disjoint(roles)
    }
}

pub fn is_admin(member: &MemberInfo, config: &GuildConfig, bot_owner_id: Option<u64>) -> bool {
    member.is_owner
        || bot_owner_id == Some(member.user_id)
        || member.has_any(&config.admin_roles)
}

pub fn is_support_staff(member: &MemberInfo, config: &GuildConfig) -> bool {
    member.has_any(&config.support_roles)
}

pub fn is_trade_staff(member: &MemberInfo, config: &GuildConfig) -> bool {
    member.has_any(&config.mm_roles)
}

/// Admins manage any ticket. Otherwise it depends on the category the
/// channel sits in; anything outside both categories is admin-only.
pub fn can_manage_ticket(
    member: &MemberInfo,
    config: &GuildConfig,
    parent_id: Option<u64>,
    bot_owner_id: Option<u64>,
) -> bool {
    if is_admin(member, config, bot_owner_id) {
        return true;
    }

    match parent_id {
        Some(parent) if config.support_category_id == Some(parent) => is_support_staff(member, config),
        Some(parent) if config.mm_category_id == Some(parent) => {
            is_support_staff(member, config) || is_trade_staff(member, config)
        }
        _ => false,
    }
}
