//! Gateway event intake.

use poise::serenity_prelude as serenity;

use crate::archive::discord::snapshot_from;
use crate::archive::model::{LiveEvent, MessageRef, ReactionDirection};
use crate::archive::report;
use crate::Data;

fn reference(id: serenity::MessageId, channel_id: serenity::ChannelId) -> MessageRef {
    MessageRef::Reference {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
    }
}

/// Maps the gateway events the archiver cares about.
pub fn live_event(event: &serenity::FullEvent) -> Option<LiveEvent> {
    match event {
        serenity::FullEvent::Message { new_message } => Some(LiveEvent::Created(
            MessageRef::Loaded(snapshot_from(new_message)),
        )),
        serenity::FullEvent::MessageUpdate { new, event, .. } => {
            let message = match new {
                Some(message) => MessageRef::Loaded(snapshot_from(message)),
                None => reference(event.id, event.channel_id),
            };
            Some(LiveEvent::Edited(message))
        }
        serenity::FullEvent::MessageDelete {
            channel_id,
            deleted_message_id,
            ..
        } => Some(LiveEvent::Deleted {
            id: deleted_message_id.to_string(),
            channel_id: channel_id.to_string(),
        }),
        serenity::FullEvent::ReactionAdd { add_reaction } => Some(LiveEvent::ReactionChanged {
            message: reference(add_reaction.message_id, add_reaction.channel_id),
            direction: ReactionDirection::Added,
        }),
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            Some(LiveEvent::ReactionChanged {
                message: reference(removed_reaction.message_id, removed_reaction.channel_id),
                direction: ReactionDirection::Removed,
            })
        }
        _ => None,
    }
}

pub async fn handle_event(event: &serenity::FullEvent, data: &Data) {
    let Some(archiver) = &data.archiver else {
        return;
    };
    let Some(event) = live_event(event) else {
        return;
    };

    let id = event.message_id().to_string();
    let result = archiver.dispatch(event).await;
    report("live event", &id, &result);
}
