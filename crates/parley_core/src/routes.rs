//! Route catalog.
//!
//! Static definitions of the endpoints the REST client exposes. Each is
//! compiled with concrete IDs before dispatch.

use crate::{HttpMethod, Route};

// Channels
/// Fetch a channel.
pub const GET_CHANNEL: Route = Route::new(HttpMethod::Get, "/channels/{channel}");
/// Delete or close a channel.
pub const DELETE_CHANNEL: Route = Route::new(HttpMethod::Delete, "/channels/{channel}");
/// Trigger the typing indicator.
pub const POST_CHANNEL_TYPING: Route = Route::new(HttpMethod::Post, "/channels/{channel}/typing");

// Messages
/// List channel messages.
pub const GET_CHANNEL_MESSAGES: Route = Route::new(HttpMethod::Get, "/channels/{channel}/messages");
/// Create a message.
pub const POST_CHANNEL_MESSAGES: Route =
    Route::new(HttpMethod::Post, "/channels/{channel}/messages");
/// Fetch one message.
pub const GET_CHANNEL_MESSAGE: Route =
    Route::new(HttpMethod::Get, "/channels/{channel}/messages/{message}");
/// Edit a message.
pub const PATCH_CHANNEL_MESSAGE: Route =
    Route::new(HttpMethod::Patch, "/channels/{channel}/messages/{message}");
/// Delete a message.
pub const DELETE_CHANNEL_MESSAGE: Route =
    Route::new(HttpMethod::Delete, "/channels/{channel}/messages/{message}");

// Reactions
/// Add a reaction as the current user.
pub const PUT_MY_REACTION: Route = Route::new(
    HttpMethod::Put,
    "/channels/{channel}/messages/{message}/reactions/{emoji}/@me",
);

// Guilds
/// Fetch a guild.
pub const GET_GUILD: Route = Route::new(HttpMethod::Get, "/guilds/{guild}");
/// Begin a guild prune.
pub const POST_GUILD_PRUNE: Route = Route::new(HttpMethod::Post, "/guilds/{guild}/prune");

// Members
/// Fetch a guild member.
pub const GET_GUILD_MEMBER: Route = Route::new(HttpMethod::Get, "/guilds/{guild}/members/{user}");
/// Kick a guild member.
pub const DELETE_GUILD_MEMBER: Route =
    Route::new(HttpMethod::Delete, "/guilds/{guild}/members/{user}");

// Webhooks
/// Fetch a webhook.
pub const GET_WEBHOOK: Route = Route::new(HttpMethod::Get, "/webhooks/{webhook}");
/// Execute a webhook with its token.
pub const POST_WEBHOOK_WITH_TOKEN: Route =
    Route::new(HttpMethod::Post, "/webhooks/{webhook}/{token}");

// Gateway
/// Gateway connection recommendations for a bot.
pub const GET_GATEWAY_BOT: Route = Route::new(HttpMethod::Get, "/gateway/bot");

// Users
/// The current user.
pub const GET_MY_USER: Route = Route::new(HttpMethod::Get, "/users/@me");

// OAuth2
/// Exchange client credentials for a bearer token.
pub const POST_TOKEN: Route = Route::new(HttpMethod::Post, "/oauth2/token");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_route_scopes_by_channel_only() {
        let compiled = PUT_MY_REACTION
            .compile(&[("channel", &1u64), ("message", &2u64), ("emoji", &"%F0%9F%91%8D")])
            .unwrap();
        assert_eq!(compiled.major_params(), "1");
        assert_eq!(
            compiled.path(),
            "/channels/1/messages/2/reactions/%F0%9F%91%8D/@me"
        );
    }

    #[test]
    fn unscoped_routes_use_placeholder() {
        let compiled = GET_GATEWAY_BOT.compile(&[]).unwrap();
        assert_eq!(compiled.major_params(), "-");
        assert_eq!(compiled.route_identity(), "GET /gateway/bot");
    }
}
