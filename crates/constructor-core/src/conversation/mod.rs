//! Multi-step conversation flows
//!
//! Each flow is a chain of [`State`] variants. [`State::apply`] is the only
//! way to move between them; anything it does not list is rejected.
//!
//! | flow        | steps                                                  |
//! |-------------|--------------------------------------------------------|
//! | bot         | `AwaitingToken` → `ConfirmingBot`                      |
//! | broadcast   | `AwaitingBroadcastBody` → `ConfirmingBroadcast`        |
//! | user search | `AwaitingUserQuery`                                    |
//! | channel     | `AwaitingChannel`                                      |
//! | extension   | `AwaitingBotExtension`                                 |

mod tracker;

pub use tracker::ConversationTracker;

use crate::validator::{BotInfo, BotToken};
use thiserror::Error;

/// Current step of a user's conversation
#[derive(Clone, Debug, PartialEq, Default)]
pub enum State {
    /// No flow in progress
    #[default]
    Idle,
    /// Waiting for the user to paste a bot token
    AwaitingToken,
    /// Token validated, waiting for the user to confirm the bot
    ConfirmingBot {
        /// Validated credential
        token: BotToken,
        /// `getMe` result shown to the user
        info: BotInfo,
    },
    /// Waiting for an admin to type the broadcast text
    AwaitingBroadcastBody,
    /// Body accepted, waiting for the admin to confirm sending
    ConfirmingBroadcast {
        /// Text to send
        body: String,
    },
    /// Waiting for an admin to type a user id or username
    AwaitingUserQuery,
    /// Waiting for an admin to type a channel to require
    AwaitingChannel,
    /// Waiting for an admin to type `<bot id> <days>`
    AwaitingBotExtension,
}

/// Input that moves a conversation forward
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// "Add bot" pressed
    BeginBotCreation,
    /// Submitted token passed validation
    TokenValidated {
        /// Validated credential
        token: BotToken,
        /// `getMe` result
        info: BotInfo,
    },
    /// "Broadcast" pressed
    BeginBroadcast,
    /// Broadcast text passed validation
    BodyAccepted {
        /// Text to send
        body: String,
    },
    /// "Search user" pressed
    BeginUserSearch,
    /// Search finished (found or not)
    QueryResolved,
    /// "Add channel" pressed
    BeginChannelAdd,
    /// Channel stored
    ChannelAdded,
    /// "Extend bot time" pressed
    BeginBotExtension,
    /// Extension granted
    BotExtended,
    /// Confirmation button pressed
    Confirm,
    /// `/cancel` or the cancel button
    Cancel,
}

/// Event that the current step does not accept
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{event}' is not valid while {state}")]
pub struct TransitionError {
    /// Step name
    pub state: &'static str,
    /// Event name
    pub event: &'static str,
}

impl State {
    /// Short name of the step, for logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingToken => "awaiting token",
            Self::ConfirmingBot { .. } => "confirming bot",
            Self::AwaitingBroadcastBody => "awaiting broadcast body",
            Self::ConfirmingBroadcast { .. } => "confirming broadcast",
            Self::AwaitingUserQuery => "awaiting user query",
            Self::AwaitingChannel => "awaiting channel",
            Self::AwaitingBotExtension => "awaiting bot extension",
        }
    }

    /// Whether no flow is in progress.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Apply an event to the current step.
    ///
    /// Cancel always returns to [`State::Idle`]. Starting a flow abandons
    /// whatever flow was in progress.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for events the step does not accept.
    pub fn apply(self, event: Event) -> Result<Self, TransitionError> {
        match (self, event) {
            (_, Event::Cancel) => Ok(Self::Idle),

            // Entry points
            (_, Event::BeginBotCreation) => Ok(Self::AwaitingToken),
            (_, Event::BeginBroadcast) => Ok(Self::AwaitingBroadcastBody),
            (_, Event::BeginUserSearch) => Ok(Self::AwaitingUserQuery),
            (_, Event::BeginChannelAdd) => Ok(Self::AwaitingChannel),
            (_, Event::BeginBotExtension) => Ok(Self::AwaitingBotExtension),

            // Bot creation
            (Self::AwaitingToken, Event::TokenValidated { token, info }) => {
                Ok(Self::ConfirmingBot { token, info })
            }
            (Self::ConfirmingBot { .. }, Event::Confirm) => Ok(Self::Idle),

            // Broadcast
            (Self::AwaitingBroadcastBody, Event::BodyAccepted { body }) => {
                Ok(Self::ConfirmingBroadcast { body })
            }
            (Self::ConfirmingBroadcast { .. }, Event::Confirm) => Ok(Self::Idle),

            // User search
            (Self::AwaitingUserQuery, Event::QueryResolved) => Ok(Self::Idle),

            // Admin input
            (Self::AwaitingChannel, Event::ChannelAdded) => Ok(Self::Idle),
            (Self::AwaitingBotExtension, Event::BotExtended) => Ok(Self::Idle),

            (state, event) => Err(TransitionError {
                state: state.name(),
                event: event.name(),
            }),
        }
    }
}

impl Event {
    /// Short name of the event, for logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BeginBotCreation => "begin bot creation",
            Self::TokenValidated { .. } => "token validated",
            Self::BeginBroadcast => "begin broadcast",
            Self::BodyAccepted { .. } => "body accepted",
            Self::BeginUserSearch => "begin user search",
            Self::QueryResolved => "query resolved",
            Self::BeginChannelAdd => "begin channel add",
            Self::ChannelAdded => "channel added",
            Self::BeginBotExtension => "begin bot extension",
            Self::BotExtended => "bot extended",
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_bot_info, sample_token};

    fn every_state() -> Vec<State> {
        vec![
            State::Idle,
            State::AwaitingToken,
            State::ConfirmingBot {
                token: sample_token(),
                info: sample_bot_info(),
            },
            State::AwaitingBroadcastBody,
            State::ConfirmingBroadcast {
                body: "hello".into(),
            },
            State::AwaitingUserQuery,
            State::AwaitingChannel,
            State::AwaitingBotExtension,
        ]
    }

    #[test]
    fn cancel_from_any_step_is_idle() {
        for state in every_state() {
            assert_eq!(state.apply(Event::Cancel), Ok(State::Idle));
        }
    }

    #[test]
    fn bot_creation_flow() {
        let state = State::Idle
            .apply(Event::BeginBotCreation)
            .and_then(|s| {
                s.apply(Event::TokenValidated {
                    token: sample_token(),
                    info: sample_bot_info(),
                })
            })
            .expect("valid flow");
        assert!(matches!(state, State::ConfirmingBot { .. }));
        assert_eq!(state.apply(Event::Confirm), Ok(State::Idle));
    }

    #[test]
    fn broadcast_flow() {
        let state = State::Idle
            .apply(Event::BeginBroadcast)
            .and_then(|s| s.apply(Event::BodyAccepted { body: "hi".into() }))
            .expect("valid flow");
        assert_eq!(
            state,
            State::ConfirmingBroadcast { body: "hi".into() }
        );
        assert_eq!(state.apply(Event::Confirm), Ok(State::Idle));
    }

    #[test]
    fn admin_input_flows() {
        let channel = State::Idle.apply(Event::BeginChannelAdd).expect("valid flow");
        assert_eq!(channel, State::AwaitingChannel);
        assert_eq!(channel.apply(Event::ChannelAdded), Ok(State::Idle));

        let extension = State::AwaitingUserQuery
            .apply(Event::BeginBotExtension)
            .expect("valid flow");
        assert_eq!(extension, State::AwaitingBotExtension);
        assert!(extension.clone().apply(Event::ChannelAdded).is_err());
        assert_eq!(extension.apply(Event::BotExtended), Ok(State::Idle));
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        assert_eq!(
            State::Idle.apply(Event::Confirm),
            Err(TransitionError {
                state: "idle",
                event: "confirm"
            })
        );
        assert!(State::AwaitingToken
            .apply(Event::BodyAccepted { body: "x".into() })
            .is_err());
        assert!(State::AwaitingBroadcastBody
            .apply(Event::TokenValidated {
                token: sample_token(),
                info: sample_bot_info(),
            })
            .is_err());
        assert!(State::AwaitingBroadcastBody.apply(Event::Confirm).is_err());
        assert!(State::Idle.apply(Event::QueryResolved).is_err());
    }

    #[test]
    fn starting_a_flow_abandons_the_previous_one() {
        let state = State::ConfirmingBroadcast { body: "x".into() };
        assert_eq!(state.apply(Event::BeginBotCreation), Ok(State::AwaitingToken));
    }
}
