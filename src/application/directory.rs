//! Workspace member and channel lists.
//!
//! Both lists are fetched once and cached as CSV next to the exports. Later
//! runs read the cache unless a refresh is requested or the file is missing.

use std::path::Path;

use crate::domain::{AppError, Channel, Member, Result, UserDirectory};
use crate::infrastructure::{
    read_channels, read_members, write_channels, write_members, ApiMethod, Transport,
};

use super::fetcher::Fetcher;
use super::pacing::Pacer;
use super::paginator::{paginate, PageRequest};
use super::parser::{page_items, parse_channel, parse_member, RawChannel, RawUser};

const MEMBERS_PAGE_SIZE: u32 = 200;
const CHANNELS_PAGE_SIZE: u32 = 1000;
const CHANNEL_TYPES: &str = "public_channel,private_channel";

/// Fetches every active human member of the workspace.
///
/// # Errors
/// Returns error if the `users.list` pagination fails.
pub fn fetch_members<T: Transport, P: Pacer>(
    fetcher: &Fetcher<T, P>,
    max_pages: usize,
) -> Result<Vec<Member>> {
    let request = PageRequest::new(ApiMethod::UsersList).param("limit", MEMBERS_PAGE_SIZE);

    let members: Vec<Member> = paginate(fetcher, &request, max_pages, |page| {
        page_items::<RawUser>(page, "members")
    })?
    .iter()
    .filter_map(parse_member)
    .collect();

    tracing::info!(count = members.len(), "Fetched workspace members");
    Ok(members)
}

/// Fetches public and private channels, optionally only those the bot is in.
///
/// # Errors
/// Returns error if the `conversations.list` pagination fails.
pub fn fetch_channels<T: Transport, P: Pacer>(
    fetcher: &Fetcher<T, P>,
    only_joined: bool,
    max_pages: usize,
) -> Result<Vec<Channel>> {
    let request = PageRequest::new(ApiMethod::ConversationsList)
        .param("types", CHANNEL_TYPES)
        .param("limit", CHANNELS_PAGE_SIZE);

    let channels: Vec<Channel> = paginate(fetcher, &request, max_pages, |page| {
        page_items::<RawChannel>(page, "channels")
    })?
    .iter()
    .filter_map(parse_channel)
    .filter(|c| !only_joined || c.is_member)
    .collect();

    tracing::info!(count = channels.len(), only_joined, "Fetched channel list");
    Ok(channels)
}

/// Joins the bot to a channel.
///
/// # Errors
/// Returns the API error if Slack refuses the join.
pub fn join_channel<T: Transport, P: Pacer>(fetcher: &Fetcher<T, P>, channel: &Channel) -> Result<()> {
    let params = [("channel".to_string(), channel.id.clone())];
    fetcher.fetch(ApiMethod::ConversationsJoin, &params)?;
    tracing::info!(channel = %channel.name, "Joined channel");
    Ok(())
}

/// Loads workspace members, refreshing the cache when asked to or when it
/// does not exist yet.
///
/// # Errors
/// Returns error if the fetch or the cache file I/O fails. A run stopped
/// during the fetch leaves the cache untouched and returns
/// [`AppError::Cancelled`].
pub fn load_members<T: Transport, P: Pacer>(
    fetcher: &Fetcher<T, P>,
    cache: &Path,
    refresh: bool,
    max_pages: usize,
) -> Result<Vec<Member>> {
    if refresh || !cache.exists() {
        let members = fetch_members(fetcher, max_pages)?;
        ensure_complete(fetcher)?;
        write_members(cache, &members)?;
        return Ok(members);
    }

    read_members(cache)
}

/// [`load_members`] indexed by user id.
///
/// # Errors
/// Same as [`load_members`].
pub fn load_user_directory<T: Transport, P: Pacer>(
    fetcher: &Fetcher<T, P>,
    cache: &Path,
    refresh: bool,
    max_pages: usize,
) -> Result<UserDirectory> {
    load_members(fetcher, cache, refresh, max_pages).map(UserDirectory::from_members)
}

/// Loads the channel list, refreshing the cache when asked to or when it
/// does not exist yet.
///
/// The cache stores only channels that passed the membership filter at fetch
/// time.
///
/// # Errors
/// Same as [`load_members`].
pub fn load_channel_list<T: Transport, P: Pacer>(
    fetcher: &Fetcher<T, P>,
    cache: &Path,
    refresh: bool,
    only_joined: bool,
    max_pages: usize,
) -> Result<Vec<Channel>> {
    if refresh || !cache.exists() {
        let channels = fetch_channels(fetcher, only_joined, max_pages)?;
        ensure_complete(fetcher)?;
        write_channels(cache, &channels)?;
        return Ok(channels);
    }

    read_channels(cache)
}

/// A cancelled pagination returns a partial list, which must not be cached.
fn ensure_complete<T: Transport, P: Pacer>(fetcher: &Fetcher<T, P>) -> Result<()> {
    if fetcher.cancel_token().is_cancelled() {
        return Err(AppError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fetcher::RetryPolicy;
    use crate::application::testing::{api_error, page, RecordingPacer, ScriptedTransport};
    use crate::domain::CancellationToken;
    use serde_json::json;
    use tempfile::tempdir;

    fn members_page() -> serde_json::Value {
        page(
            "members",
            json!([
                {"id": "U1", "name": "alice", "profile": {"real_name": "Alice"}},
                {"id": "U2", "name": "old", "deleted": true},
                {"id": "B1", "name": "ci", "is_bot": true}
            ]),
            None,
        )
    }

    fn channels_page() -> serde_json::Value {
        page(
            "channels",
            json!([
                {"id": "C1", "name": "general", "is_member": true},
                {"id": "C2", "name": "random", "is_member": false}
            ]),
            None,
        )
    }

    #[test]
    fn test_members_fetched_then_cached() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("members.csv");
        let transport = ScriptedTransport::new();
        transport.respond(ApiMethod::UsersList, members_page());
        let fetcher = Fetcher::new(&transport, RecordingPacer::default(), RetryPolicy::default(), CancellationToken::new());

        let users = load_user_directory(&fetcher, &cache, false, 10).unwrap();
        assert_eq!(users.resolve("U1"), "Alice");
        assert_eq!(users.resolve("U2"), "U2");
        assert_eq!(read_members(&cache).unwrap().len(), 1);
        assert!(cache.exists());

        // Second load comes from the cache; no response is scripted for it.
        let cached = load_user_directory(&fetcher, &cache, false, 10).unwrap();
        assert_eq!(cached.resolve("U1"), "Alice");
        assert_eq!(transport.call_count(ApiMethod::UsersList), 1);

        let params = transport.params_of(ApiMethod::UsersList);
        assert!(params[0].contains(&("limit".to_string(), "200".to_string())));
    }

    #[test]
    fn test_refresh_refetches_existing_cache() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("members.csv");
        write_members(&cache, &[Member { id: "U9".into(), name: "Stale".into() }]).unwrap();

        let transport = ScriptedTransport::new();
        transport.respond(ApiMethod::UsersList, members_page());
        let fetcher = Fetcher::new(&transport, RecordingPacer::default(), RetryPolicy::default(), CancellationToken::new());

        let users = load_user_directory(&fetcher, &cache, true, 10).unwrap();
        assert_eq!(users.resolve("U9"), "U9");
        assert_eq!(read_members(&cache).unwrap().len(), 1);
    }

    #[test]
    fn test_only_joined_filters_channels() {
        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::new();
        transport.respond(ApiMethod::ConversationsList, channels_page());
        transport.respond(ApiMethod::ConversationsList, channels_page());
        let fetcher = Fetcher::new(&transport, RecordingPacer::default(), RetryPolicy::default(), CancellationToken::new());

        let joined = load_channel_list(&fetcher, &dir.path().join("a.csv"), false, true, 10).unwrap();
        let all = load_channel_list(&fetcher, &dir.path().join("b.csv"), false, false, 10).unwrap();

        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].name, "general");
        assert_eq!(all.len(), 2);

        let params = transport.params_of(ApiMethod::ConversationsList);
        assert!(params[0].contains(&("types".to_string(), CHANNEL_TYPES.to_string())));
    }

    #[test]
    fn test_cancelled_fetch_leaves_no_cache() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("channel_list.csv");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let transport = ScriptedTransport::new();
        let fetcher = Fetcher::new(&transport, RecordingPacer::default(), RetryPolicy::default(), cancel);

        let err = load_channel_list(&fetcher, &cache, false, true, 10).unwrap_err();
        assert!(err.is_cancelled());
        assert!(!cache.exists());
    }

    #[test]
    fn test_join_failure_is_reported() {
        let transport = ScriptedTransport::new();
        transport.respond(ApiMethod::ConversationsJoin, api_error("is_archived"));
        let fetcher = Fetcher::new(&transport, RecordingPacer::default(), RetryPolicy::default(), CancellationToken::new());

        let err = join_channel(&fetcher, &Channel::new("C1", "old")).unwrap_err();
        assert!(err.is_api_error("is_archived"));
    }
}
