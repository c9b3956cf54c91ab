//! Robot client - relays sitreps to a decision function and sends its orders back

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::game::r#match::PhaseKind;
use crate::game::server::isolate;
use crate::game::world::{Action, World};
use crate::net::protocol::{
    self, truncate_nick, ClientMsg, Identity, PlayerRecord, ServerMsg, Will,
};
use crate::net::transport::{Datagram, Transport};

/// Decides what a robot does next, given the latest world
pub trait Brain {
    fn decide(&mut self, me: &Identity, world: &World) -> Option<Action>;
}

impl<F> Brain for F
where
    F: FnMut(&Identity, &World) -> Option<Action>,
{
    fn decide(&mut self, me: &Identity, world: &World) -> Option<Action> {
        self(me, world)
    }
}

/// Shoot the first robot that is not ours
pub fn first_rival(me: &Identity, world: &World) -> Option<Action> {
    world
        .robots
        .keys()
        .find(|owner| *owner != me)
        .map(|rival| Action {
            target: Some(rival.clone()),
            move_to: None,
        })
}

/// Client side of the phase cycle
pub struct ClientState<B> {
    identity: Identity,
    nick: String,
    want: Will,
    phase: Option<PhaseKind>,
    players: BTreeMap<Identity, PlayerRecord>,
    turn: Option<u64>,
    brain: B,
}

impl<B: Brain> ClientState<B> {
    /// An empty nick falls back to the identity
    pub fn new(identity: Identity, nick: Option<&str>, want: Will, brain: B) -> Self {
        let nick = match nick {
            Some(nick) if !nick.is_empty() => truncate_nick(nick),
            _ => truncate_nick(identity.as_str()),
        };

        Self {
            identity,
            nick,
            want,
            phase: None,
            players: BTreeMap::new(),
            turn: None,
            brain,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn phase(&self) -> Option<PhaseKind> {
        self.phase
    }

    pub fn players(&self) -> &BTreeMap<Identity, PlayerRecord> {
        &self.players
    }

    pub fn turn(&self) -> Option<u64> {
        self.turn
    }

    /// Enter registration with an empty roster
    pub fn begin_registration(&mut self) -> Option<ClientMsg> {
        self.phase = Some(PhaseKind::Registration);
        self.players.clear();
        self.tick()
    }

    /// Keep saying hello until a roster arrives
    pub fn tick(&mut self) -> Option<ClientMsg> {
        if self.phase == Some(PhaseKind::Registration) && self.players.is_empty() {
            return Some(ClientMsg::Hello {
                want: Some(self.want),
                nick: self.nick.clone(),
            });
        }
        None
    }

    /// Apply a server message, returning a reply if one is due
    pub fn handle(&mut self, msg: ServerMsg) -> Option<ClientMsg> {
        match msg {
            ServerMsg::Roster { players } => {
                self.players = players;
                None
            }
            ServerMsg::Sitrep { world, turn } => {
                self.phase = Some(PhaseKind::Game);
                self.turn = Some(turn);

                let action = self
                    .brain
                    .decide(&self.identity, &world)
                    .unwrap_or_default();

                Some(ClientMsg::Action {
                    turn: Some(turn),
                    target: action.target,
                    move_to: action.move_to,
                })
            }
            ServerMsg::Results { world, turn } => {
                self.phase = Some(PhaseKind::Results);
                let winners = self.nicks(world.robots.keys());
                let losers = self.nicks(world.wrecks.keys());
                info!(turn, ?winners, ?losers, "Game over");
                None
            }
            ServerMsg::End => self.begin_registration(),
        }
    }

    fn nicks<'a>(&self, owners: impl Iterator<Item = &'a Identity>) -> Vec<String> {
        owners
            .map(|owner| {
                self.players
                    .get(owner)
                    .map(|record| record.nick.clone())
                    .unwrap_or_else(|| owner.to_string())
            })
            .collect()
    }
}

/// Client dispatch loop over a transport
pub struct RobotClient<T, B> {
    state: ClientState<B>,
    transport: T,
    poll_timeout: Duration,
}

impl<T: Transport, B: Brain> RobotClient<T, B> {
    pub fn new(transport: T, state: ClientState<B>, poll_timeout: Duration) -> Self {
        Self {
            state,
            transport,
            poll_timeout,
        }
    }

    pub fn state(&self) -> &ClientState<B> {
        &self.state
    }

    /// Register, then dispatch server messages until the task is dropped
    pub async fn run(mut self) {
        info!(identity = %self.state.identity(), nick = self.state.nick(), "Robot client running");

        let hello = self.state.begin_registration();
        self.send(hello).await;

        loop {
            self.step().await;
        }
    }

    /// One loop iteration: tick, receive, dispatch
    pub async fn step(&mut self) {
        let reply = self.state.tick();
        self.send(reply).await;

        let Datagram { peer, payload } = match self.transport.recv(self.poll_timeout).await {
            Ok(Some(datagram)) => datagram,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Discarding undeliverable datagram");
                return;
            }
        };

        let msg = match protocol::decode::<ServerMsg>(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(identity = %peer, error = %e, "Discarding invalid message");
                return;
            }
        };

        let kind = msg.kind();
        debug!(identity = %peer, kind, "Received message");

        let state = &mut self.state;
        match isolate(kind, &peer, move || state.handle(msg)) {
            Ok(reply) => self.send(reply).await,
            Err(e) => error!(error = %e, "Message handling failed, continuing"),
        }
    }

    async fn send(&mut self, msg: Option<ClientMsg>) {
        let Some(msg) = msg else {
            return;
        };

        let payload = match protocol::encode(&msg) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = msg.kind(), error = %e, "Failed to encode message");
                return;
            }
        };

        debug!(kind = msg.kind(), "Sending message");
        if let Err(e) = self.transport.send(&Identity::server(), &payload).await {
            warn!(error = %e, "Send failed");
        }
    }
}
