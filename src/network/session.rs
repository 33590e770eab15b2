//! Game Session State Machine
//!
//! Consumes local input and channel events one at a time, drives the board
//! and turn authority, and emits peer messages. Synchronous: nothing here
//! blocks or awaits, so the caller decides how events are merged.
//!
//! ```text
//! AwaitingConnection ──Opened──> Connected ──move──> InProgress <──> Completed
//!          │                         │                    │              │
//!          └─────────── Closed / Errored (terminal) ──────┴──────────────┘
//! ```

use std::fmt;
use tracing::{debug, info, warn};

use crate::game::board::{Board, Outcome};
use crate::game::role::{role_mark, Role};
use crate::game::turn::{TurnAuthority, TurnState};
use crate::network::channel::{ChannelEvent, MessageSink};
use crate::network::protocol::{PeerMessage, ProtocolViolation};

/// Session phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the channel to open.
    AwaitingConnection,
    /// Channel open, no move played yet.
    Connected,
    /// Round being played.
    InProgress,
    /// Round won or drawn; restart allowed.
    Completed,
    /// Channel closed. Terminal.
    Disconnected,
    /// Channel failed. Terminal.
    Errored {
        /// Transport error description.
        detail: String,
    },
}

impl SessionPhase {
    /// Check if the session can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Disconnected | SessionPhase::Errored { .. })
    }

    /// Check if game traffic is accepted.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionPhase::Connected | SessionPhase::InProgress | SessionPhase::Completed
        )
    }
}

/// Input from the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalInput {
    /// Claim a cell.
    Move(usize),
    /// Start a new round.
    Restart,
}

/// One entry of the merged event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Local player action.
    Local(LocalInput),
    /// Event from the channel.
    Channel(ChannelEvent),
}

/// Human-readable status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Channel failed.
    ConnectionError,
    /// Channel closed.
    Disconnected,
    /// Round won.
    Winner(Role),
    /// Round drawn.
    Draw,
    /// Channel open.
    Connected,
    /// Channel not open yet.
    Waiting,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::ConnectionError => f.write_str("Error in connection"),
            Status::Disconnected => f.write_str("Disconnected from server"),
            Status::Winner(role) => write!(f, "Winner: {}", role_mark(*role)),
            Status::Draw => f.write_str("It's a DRAW"),
            Status::Connected => f.write_str("Connected"),
            Status::Waiting => f.write_str("Waiting for another player..."),
        }
    }
}

/// Status for a phase and outcome.
///
/// Priority: connection failure or close, then round outcome, then
/// "Connected", then waiting.
pub fn project_status(phase: &SessionPhase, outcome: Outcome) -> Status {
    match phase {
        SessionPhase::Errored { .. } => return Status::ConnectionError,
        SessionPhase::Disconnected => return Status::Disconnected,
        _ => {}
    }
    match outcome {
        Outcome::Won(role) => return Status::Winner(role),
        Outcome::Draw => return Status::Draw,
        Outcome::InProgress => {}
    }
    if phase.is_live() {
        Status::Connected
    } else {
        Status::Waiting
    }
}

/// Read-only snapshot handed to displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Local role.
    pub role: Role,
    /// Current board.
    pub board: Board,
    /// Local turn.
    pub turn: TurnState,
    /// Board classification.
    pub outcome: Outcome,
    /// Session phase.
    pub phase: SessionPhase,
    /// Status line.
    pub status: Status,
    /// Whether the peer has shown up.
    pub opponent_present: bool,
    /// Whether a local restart would be accepted.
    pub can_restart: bool,
}

/// Client-side session for one room.
pub struct GameSession<S: MessageSink> {
    role: Role,
    board: Board,
    turn: TurnAuthority,
    phase: SessionPhase,
    status: Status,
    opponent_present: bool,
    sink: S,
}

impl<S: MessageSink> GameSession<S> {
    /// Create a session waiting for its channel to open.
    pub fn new(role: Role, sink: S) -> Self {
        let phase = SessionPhase::AwaitingConnection;
        let board = Board::new();
        Self {
            role,
            board,
            turn: TurnAuthority::new(role),
            status: project_status(&phase, board.evaluate()),
            phase,
            opponent_present: false,
            sink,
        }
    }

    /// Local role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Local turn.
    pub fn turn(&self) -> TurnState {
        self.turn.state()
    }

    /// Board classification, evaluated on demand.
    pub fn outcome(&self) -> Outcome {
        self.board.evaluate()
    }

    /// Session phase.
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Status line as of the last transition.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether the peer announced itself or has played.
    pub fn opponent_present(&self) -> bool {
        self.opponent_present
    }

    /// Whether a local restart would be accepted.
    pub fn can_restart(&self) -> bool {
        self.phase == SessionPhase::Completed
    }

    /// Check if the session has ended.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Outbound sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Snapshot for display.
    pub fn view(&self) -> SessionView {
        SessionView {
            role: self.role,
            board: self.board,
            turn: self.turn.state(),
            outcome: self.outcome(),
            phase: self.phase.clone(),
            status: self.status,
            opponent_present: self.opponent_present,
            can_restart: self.can_restart(),
        }
    }

    /// Feed one event. Returns `true` if the session changed.
    pub fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Local(LocalInput::Move(index)) => self.local_move(index),
            SessionEvent::Local(LocalInput::Restart) => self.local_restart(),
            SessionEvent::Channel(ChannelEvent::Opened) => self.on_opened(),
            SessionEvent::Channel(ChannelEvent::Message(message)) => self.on_peer_message(message),
            SessionEvent::Channel(ChannelEvent::Malformed(violation)) => self.on_malformed(&violation),
            SessionEvent::Channel(ChannelEvent::Closed) => self.on_closed(),
            SessionEvent::Channel(ChannelEvent::Errored(detail)) => self.on_errored(detail),
        }
    }

    /// Channel opened: announce presence.
    pub fn on_opened(&mut self) -> bool {
        if self.phase != SessionPhase::AwaitingConnection {
            debug!("Ignoring open in phase {:?}", self.phase);
            return false;
        }
        info!("Connected as {} player", self.role);
        self.phase = SessionPhase::Connected;
        self.send(PeerMessage::Ready);
        self.refresh();
        true
    }

    /// Local player claims `index`. Silently ignored unless it is the local
    /// turn, the cell is empty and the round is undecided.
    pub fn local_move(&mut self, index: usize) -> bool {
        if !self.phase.is_live() {
            debug!("Ignoring move at {}: phase {:?}", index, self.phase);
            return false;
        }
        if !self.turn.is_my_turn() {
            debug!("Ignoring move at {}: opponent's turn", index);
            return false;
        }
        let board = match self.board.apply_mark(index, role_mark(self.role)) {
            Ok(board) => board,
            Err(e) => {
                debug!("Ignoring move at {}: {}", index, e);
                return false;
            }
        };
        if let Err(e) = self.turn.on_local_move_accepted() {
            warn!("Turn authority rejected local move: {}", e);
            return false;
        }

        self.board = board;
        // Accepted indices are 0-8.
        self.send(PeerMessage::MakeMove { index: index as u8 });
        self.after_move();
        true
    }

    /// Local player restarts a completed round.
    pub fn local_restart(&mut self) -> bool {
        if !self.can_restart() {
            debug!("Ignoring restart in phase {:?}", self.phase);
            return false;
        }
        self.reset_round();
        self.send(PeerMessage::Restart);
        info!("Round restarted locally");
        self.refresh();
        true
    }

    /// Message from the peer.
    pub fn on_peer_message(&mut self, message: PeerMessage) -> bool {
        if !self.phase.is_live() {
            debug!("Ignoring {} in phase {:?}", message.kind(), self.phase);
            return false;
        }
        self.opponent_present = true;

        match message {
            PeerMessage::Ready => {
                info!("Opponent joined");
                self.refresh();
                true
            }
            PeerMessage::MakeMove { index } => self.remote_move(usize::from(index)),
            PeerMessage::Restart => {
                // Applied unconditionally, whatever the local round state.
                self.reset_round();
                info!("Round restarted by opponent");
                self.refresh();
                true
            }
        }
    }

    /// Undecodable frame: logged, otherwise ignored.
    pub fn on_malformed(&mut self, violation: &ProtocolViolation) -> bool {
        warn!("Protocol violation from peer: {}", violation);
        false
    }

    /// Channel closed. Terminal.
    pub fn on_closed(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        info!("Disconnected from server");
        self.phase = SessionPhase::Disconnected;
        self.refresh();
        true
    }

    /// Channel failed. Terminal.
    pub fn on_errored(&mut self, detail: String) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        warn!("Connection error: {}", detail);
        self.phase = SessionPhase::Errored { detail };
        self.refresh();
        true
    }

    fn remote_move(&mut self, index: usize) -> bool {
        if self.turn.is_my_turn() {
            warn!("Desync: opponent moved at {} during local turn, discarding", index);
            return false;
        }
        let board = match self.board.apply_mark(index, role_mark(self.role.opponent())) {
            Ok(board) => board,
            Err(e) => {
                warn!("Desync: discarding opponent move at {}: {}", index, e);
                return false;
            }
        };
        if let Err(e) = self.turn.on_remote_move_received() {
            warn!("Turn authority rejected remote move: {}", e);
            return false;
        }

        self.board = board;
        self.after_move();
        true
    }

    fn after_move(&mut self) {
        match self.outcome() {
            Outcome::InProgress => self.phase = SessionPhase::InProgress,
            outcome => {
                info!("Round over: {:?}", outcome);
                self.phase = SessionPhase::Completed;
            }
        }
        self.refresh();
    }

    fn reset_round(&mut self) {
        self.board = Board::new();
        self.turn.on_restart();
        self.phase = SessionPhase::InProgress;
    }

    fn send(&self, message: PeerMessage) {
        if let Err(e) = self.sink.send(message) {
            warn!("Dropping outbound {}: {}", message.kind(), e);
        }
    }

    fn refresh(&mut self) {
        self.status = project_status(&self.phase, self.outcome());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use crate::game::board::Cell;
    use crate::game::role::Mark;
    use crate::network::channel::ChannelError;

    /// Records outbound messages; fails sends while `open` is false.
    #[derive(Default)]
    struct RecordingSink {
        open: bool,
        sent: RefCell<Vec<PeerMessage>>,
    }

    impl MessageSink for RecordingSink {
        fn send(&self, message: PeerMessage) -> Result<(), ChannelError> {
            if !self.open {
                return Err(ChannelError::NotConnected);
            }
            self.sent.borrow_mut().push(message);
            Ok(())
        }
    }

    impl GameSession<RecordingSink> {
        fn sent(&self) -> Vec<PeerMessage> {
            self.sink().sent.borrow().clone()
        }
    }

    fn connected(role: Role) -> GameSession<RecordingSink> {
        let sink = RecordingSink { open: true, ..Default::default() };
        let mut session = GameSession::new(role, sink);
        assert!(session.handle(SessionEvent::Channel(ChannelEvent::Opened)));
        session
    }

    fn remote(session: &mut GameSession<RecordingSink>, index: u8) -> bool {
        session.handle(SessionEvent::Channel(ChannelEvent::Message(PeerMessage::MakeMove { index })))
    }

    #[test]
    fn test_initial_status_waiting() {
        let session = GameSession::new(Role::First, RecordingSink::default());
        assert_eq!(session.phase(), &SessionPhase::AwaitingConnection);
        assert_eq!(session.status().to_string(), "Waiting for another player...");
        assert_eq!(session.turn(), TurnState::MyTurn);
    }

    #[test]
    fn test_open_sends_ready() {
        let session = connected(Role::Second);
        assert_eq!(session.phase(), &SessionPhase::Connected);
        assert_eq!(session.sent(), vec![PeerMessage::Ready]);
        assert_eq!(session.status(), Status::Connected);
        assert!(!session.opponent_present());
    }

    #[test]
    fn test_moves_ignored_before_open() {
        let mut session = GameSession::new(Role::First, RecordingSink::default());
        assert!(!session.local_move(0));
        assert_eq!(session.board(), &Board::new());
    }

    #[test]
    fn test_first_wins_top_row() {
        let mut session = connected(Role::First);

        assert!(session.local_move(0));
        assert_eq!(session.phase(), &SessionPhase::InProgress);
        assert!(remote(&mut session, 4));
        assert!(session.local_move(1));
        assert!(remote(&mut session, 5));
        assert!(session.local_move(2));

        assert_eq!(session.outcome(), Outcome::Won(Role::First));
        assert_eq!(session.board().winning_line(), Some([0, 1, 2]));
        assert_eq!(session.phase(), &SessionPhase::Completed);
        assert_eq!(session.status().to_string(), "Winner: X");
        assert_eq!(
            session.sent(),
            vec![
                PeerMessage::Ready,
                PeerMessage::MakeMove { index: 0 },
                PeerMessage::MakeMove { index: 1 },
                PeerMessage::MakeMove { index: 2 },
            ]
        );
    }

    #[test]
    fn test_second_sees_first_win_with_inverted_marks() {
        let mut session = connected(Role::Second);

        assert!(remote(&mut session, 0));
        assert!(session.local_move(4));
        assert!(remote(&mut session, 1));
        assert!(session.local_move(5));
        assert!(remote(&mut session, 2));

        assert_eq!(session.board().get(0), Some(Cell::Marked(Mark::X)));
        assert_eq!(session.board().get(4), Some(Cell::Marked(Mark::O)));
        assert_eq!(session.outcome(), Outcome::Won(Role::First));
        assert_eq!(session.status().to_string(), "Winner: X");
    }

    #[test]
    fn test_draw() {
        // X O X / X O O / O X X
        let mut session = connected(Role::First);
        for (mine, theirs) in [(0, 1), (2, 4), (3, 5), (7, 6)] {
            assert!(session.local_move(mine));
            assert!(remote(&mut session, theirs));
        }
        assert!(session.local_move(8));

        assert_eq!(session.outcome(), Outcome::Draw);
        assert_eq!(session.phase(), &SessionPhase::Completed);
        assert_eq!(session.status().to_string(), "It's a DRAW");
    }

    #[test]
    fn test_local_move_on_opponent_turn_ignored() {
        let mut session = connected(Role::Second);
        let sent_before = session.sent();

        assert!(!session.local_move(0));
        assert_eq!(session.board(), &Board::new());
        assert_eq!(session.sent(), sent_before);
        assert_eq!(session.turn(), TurnState::OpponentTurn);
    }

    #[test]
    fn test_local_move_on_occupied_cell_ignored() {
        let mut session = connected(Role::First);
        assert!(session.local_move(4));
        assert!(remote(&mut session, 0));
        let board = *session.board();

        assert!(!session.local_move(4));
        assert!(!session.local_move(0));
        assert!(!session.local_move(9));
        assert_eq!(session.board(), &board);
        assert_eq!(session.turn(), TurnState::MyTurn);
    }

    #[test]
    fn test_remote_move_on_occupied_cell_discarded() {
        let mut session = connected(Role::First);
        assert!(session.local_move(4));
        let board = *session.board();

        assert!(!remote(&mut session, 4));
        assert_eq!(session.board(), &board);
        assert_eq!(session.phase(), &SessionPhase::InProgress);
        assert_eq!(session.turn(), TurnState::OpponentTurn);

        // The session keeps going after the desync.
        assert!(remote(&mut session, 0));
    }

    #[test]
    fn test_remote_move_out_of_turn_discarded() {
        let mut session = connected(Role::First);
        assert!(!remote(&mut session, 3));
        assert_eq!(session.board(), &Board::new());
        assert_eq!(session.turn(), TurnState::MyTurn);
    }

    #[test]
    fn test_remote_move_out_of_range_discarded() {
        let mut session = connected(Role::Second);
        assert!(!remote(&mut session, 9));
        assert_eq!(session.board(), &Board::new());
    }

    #[test]
    fn test_restart_only_when_completed() {
        let mut session = connected(Role::First);
        assert!(!session.local_restart());
        assert!(session.local_move(0));
        assert!(!session.local_restart());
        assert!(!session.sent().contains(&PeerMessage::Restart));
    }

    #[test]
    fn test_local_restart_resets_round() {
        let mut session = connected(Role::Second);
        for (theirs, mine) in [(0, 3), (1, 4)] {
            assert!(remote(&mut session, theirs));
            assert!(session.local_move(mine));
        }
        assert!(remote(&mut session, 2));
        assert!(session.can_restart());

        assert!(session.local_restart());
        assert_eq!(session.board(), &Board::new());
        assert_eq!(session.outcome(), Outcome::InProgress);
        assert_eq!(session.turn(), TurnState::OpponentTurn);
        assert_eq!(session.phase(), &SessionPhase::InProgress);
        assert_eq!(session.role(), Role::Second);
        assert_eq!(session.sent().last(), Some(&PeerMessage::Restart));
        assert_eq!(session.status(), Status::Connected);
    }

    #[test]
    fn test_remote_restart_applies_mid_round() {
        let mut session = connected(Role::First);
        assert!(session.local_move(0));
        assert!(remote(&mut session, 4));
        assert!(session.local_move(8));

        assert!(session.handle(SessionEvent::Channel(ChannelEvent::Message(PeerMessage::Restart))));
        assert_eq!(session.board(), &Board::new());
        assert_eq!(session.turn(), TurnState::MyTurn);
        assert_eq!(session.phase(), &SessionPhase::InProgress);
        assert!(!session.sent().contains(&PeerMessage::Restart));
    }

    #[test]
    fn test_ready_marks_opponent_present() {
        let mut session = connected(Role::First);
        assert!(session.handle(SessionEvent::Channel(ChannelEvent::Message(PeerMessage::Ready))));
        assert!(session.opponent_present());
        assert_eq!(session.status(), Status::Connected);
    }

    #[test]
    fn test_malformed_ignored() {
        let mut session = connected(Role::First);
        let changed = session.handle(SessionEvent::Channel(ChannelEvent::Malformed(
            ProtocolViolation::Malformed("unknown variant".to_string()),
        )));
        assert!(!changed);
        assert_eq!(session.phase(), &SessionPhase::Connected);
        assert!(session.local_move(0));
    }

    #[test]
    fn test_close_is_terminal() {
        let mut session = connected(Role::First);
        assert!(session.local_move(0));
        assert!(session.handle(SessionEvent::Channel(ChannelEvent::Closed)));

        assert!(session.is_terminal());
        assert_eq!(session.status().to_string(), "Disconnected from server");
        assert!(!remote(&mut session, 4));
        assert!(!session.handle(SessionEvent::Channel(ChannelEvent::Opened)));
        assert!(!session.handle(SessionEvent::Channel(ChannelEvent::Errored("late".into()))));
        assert_eq!(session.phase(), &SessionPhase::Disconnected);
    }

    #[test]
    fn test_error_masks_outcome() {
        let mut session = connected(Role::First);
        for (mine, theirs) in [(0, 3), (1, 4)] {
            assert!(session.local_move(mine));
            assert!(remote(&mut session, theirs));
        }
        assert!(session.local_move(2));
        assert_eq!(session.status(), Status::Winner(Role::First));

        assert!(session.handle(SessionEvent::Channel(ChannelEvent::Errored("reset by peer".into()))));
        assert_eq!(session.status().to_string(), "Error in connection");
        assert!(!session.local_restart());
        assert_eq!(
            session.phase(),
            &SessionPhase::Errored { detail: "reset by peer".to_string() }
        );
    }

    #[test]
    fn test_not_connected_send_is_dropped() {
        let sink = RecordingSink::default();
        let mut session = GameSession::new(Role::First, sink);
        assert!(session.on_opened());
        assert!(session.local_move(0));

        assert!(session.sent().is_empty());
        assert_eq!(session.board().get(0), Some(Cell::Marked(Mark::X)));
    }

    #[test]
    fn test_status_priority() {
        let live = SessionPhase::InProgress;
        let errored = SessionPhase::Errored { detail: String::new() };
        let won = Outcome::Won(Role::Second);

        assert_eq!(project_status(&errored, won), Status::ConnectionError);
        assert_eq!(project_status(&SessionPhase::Disconnected, Outcome::Draw), Status::Disconnected);
        assert_eq!(project_status(&live, won), Status::Winner(Role::Second));
        assert_eq!(project_status(&live, Outcome::InProgress), Status::Connected);
        assert_eq!(
            project_status(&SessionPhase::AwaitingConnection, Outcome::InProgress),
            Status::Waiting
        );
    }

    #[test]
    fn test_view_snapshot() {
        let mut session = connected(Role::First);
        assert!(session.local_move(6));
        let view = session.view();
        assert_eq!(view.role, Role::First);
        assert_eq!(view.board.get(6), Some(Cell::Marked(Mark::X)));
        assert_eq!(view.turn, TurnState::OpponentTurn);
        assert_eq!(view.status, Status::Connected);
        assert!(!view.can_restart);
    }
}
