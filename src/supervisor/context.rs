use crate::data::{Room, User};
use crate::integrations::gitter::RoomDirectory;
use anyhow::Result;

/// Everything the listeners share, resolved once before they start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorContext {
    /// The account we stream as
    pub bot: User,
    /// Rooms to monitor, in directory order
    pub rooms: Vec<Room>,
}

/// Resolve the rooms to monitor and the acting account.
///
/// Both directory queries must succeed; the first failure is returned as-is.
pub async fn build_context(
    directory: &dyn RoomDirectory,
    filter: &[String],
) -> Result<SupervisorContext> {
    tracing::debug!("Getting rooms and current user...");
    let (rooms, bot) = tokio::try_join!(directory.list_rooms(), directory.current_user())?;

    let rooms = filter_rooms(rooms, filter);
    tracing::debug!("Found {} available rooms.", rooms.len());
    tracing::debug!("Current user is {}.", bot.username);

    Ok(SupervisorContext { bot, rooms })
}

/// Apply the configured room allow-list.
///
/// An empty filter keeps everything, one-to-one rooms included. Otherwise
/// only group rooms whose name matches an entry (ignoring case) are kept.
/// Filter entries that match nothing are ignored.
pub fn filter_rooms(rooms: Vec<Room>, filter: &[String]) -> Vec<Room> {
    if filter.is_empty() {
        return rooms;
    }

    rooms
        .into_iter()
        .filter(|room| !room.one_to_one && filter.iter().any(|name| room.name_matches(name)))
        .collect()
}
