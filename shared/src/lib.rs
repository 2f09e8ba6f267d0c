use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_RACE_NAME: &str = "to-the-moon";
pub const DEFAULT_SHIP: &str = "nova";
pub const LANE_OFFSETS: [f32; 2] = [33.3, 66.6];

pub type TrackId = String;

/// Lifecycle of a race session. Transitions only move forward.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackStatus {
    Awaiting,
    Active,
    Finished,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Fuel {
    pub name: String,
    pub value: f64,
}

impl Fuel {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// Loadout handed to players who join without choosing one.
pub fn default_fuel() -> Vec<Fuel> {
    vec![Fuel::new("btc", 10.0), Fuel::new("eth", 90.0)]
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ship {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for Ship {
    fn default() -> Self {
        Self {
            kind: DEFAULT_SHIP.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    /// Admission index, fixed for the lifetime of the track.
    pub position: usize,
    pub ship: Ship,
    /// Starting lane offset.
    pub x: f32,
    pub fuel: Vec<Fuel>,
}

impl Player {
    pub fn fuel_total(&self) -> f64 {
        self.fuel.iter().map(|f| f.value).sum()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub race_name: String,
    pub status: TrackStatus,
    pub start: u64,
    pub end: u64,
    pub players: Vec<Player>,
    #[serde(default)]
    pub results: Vec<SettledStanding>,
}

impl Track {
    pub fn new(id: TrackId, race_name: &str) -> Self {
        Self {
            id,
            race_name: race_name.to_string(),
            status: TrackStatus::Awaiting,
            start: 0,
            end: 0,
            players: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn is_awaiting(&self) -> bool {
        self.status == TrackStatus::Awaiting
    }

    pub fn start_descriptor(&self) -> StartDescriptor {
        StartDescriptor {
            id: self.id.clone(),
            race_name: self.race_name.clone(),
            start: self.start,
            end: self.end,
            players: self.players.clone(),
        }
    }
}

/// Payload of the `start` event.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartDescriptor {
    pub id: TrackId,
    pub race_name: String,
    pub start: u64,
    pub end: u64,
    pub players: Vec<Player>,
}

/// One entry of a score provider ranking.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStat {
    pub player_id: String,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Standing {
    pub id: String,
    pub position: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SettledStanding {
    pub id: String,
    pub position: usize,
    pub name: String,
    pub score: f64,
    pub prize: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub author: String,
    pub user_id: String,
    pub ts: u64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub track_id: TrackId,
    #[serde(default)]
    pub fuel: Vec<Fuel>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackRef {
    pub track_id: TrackId,
}

/// Lateral movement notice. Everything besides the track id is relayed untouched.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Strafe {
    pub track_id: TrackId,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatPost {
    pub chat_id: TrackId,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrackList {
    pub tracks: Vec<Track>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Joined {
    pub track_id: TrackId,
    pub player: Player,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorMessage {
    pub message: String,
}

/// Socket namespace a connection was opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Tracks,
    Race,
    Chat,
}

impl Namespace {
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/tracks" => Some(Namespace::Tracks),
            "/race" => Some(Namespace::Race),
            "/chat" => Some(Namespace::Chat),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Namespace::Tracks => "/tracks",
            Namespace::Race => "/race",
            Namespace::Chat => "/chat",
        }
    }
}

/// Events sent by clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "getTracks")]
    GetTracks,
    #[serde(rename = "joinTrack")]
    JoinTrack(JoinRequest),
    #[serde(rename = "loadTrack")]
    LoadTrack(TrackRef),
    #[serde(rename = "moveX")]
    MoveX(Strafe),
    #[serde(rename = "joinChat")]
    JoinChat(TrackRef),
    #[serde(rename = "message")]
    Message(ChatPost),
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_supported_on(&self, namespace: Namespace) -> bool {
        match self {
            ClientEvent::JoinChat(_) | ClientEvent::Message(_) => namespace == Namespace::Chat,
            _ => namespace != Namespace::Chat,
        }
    }
}

/// Events sent by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "initTracks")]
    InitTracks(TrackList),
    #[serde(rename = "joinedTrack")]
    JoinedTrack(Joined),
    #[serde(rename = "start")]
    Start(StartDescriptor),
    #[serde(rename = "moveXupdate")]
    MoveXUpdate(Strafe),
    #[serde(rename = "positionUpdate")]
    PositionUpdate(Vec<Standing>),
    #[serde(rename = "gameover")]
    Gameover(Vec<SettledStanding>),
    #[serde(rename = "joinedChat")]
    JoinedChat(Vec<ChatEntry>),
    #[serde(rename = "updateChat")]
    UpdateChat(Vec<ChatEntry>),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorMessage {
            message: message.into(),
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::InitTracks(_) => "initTracks",
            ServerEvent::JoinedTrack(_) => "joinedTrack",
            ServerEvent::Start(_) => "start",
            ServerEvent::MoveXUpdate(_) => "moveXupdate",
            ServerEvent::PositionUpdate(_) => "positionUpdate",
            ServerEvent::Gameover(_) => "gameover",
            ServerEvent::JoinedChat(_) => "joinedChat",
            ServerEvent::UpdateChat(_) => "updateChat",
            ServerEvent::Error(_) => "error",
        }
    }
}
