//! Board pin maps.
//!
//! Maps a board name to the PWM channel driving the lock servo and the
//! GPIO lines of the two indicator LEDs. Profiles are embedded at compile
//! time from `contrib/board/*.toml`.

use serde::Deserialize;
use std::sync::OnceLock;

const BOARD_RPI4: &str = include_str!("../../../contrib/board/rpi4.toml");

static BOARD_DB: OnceLock<Vec<BoardProfile>> = OnceLock::new();

/// One `contrib/board/*.toml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardProfile {
    pub board: BoardInfo,
    pub servo: ServoPins,
    pub indicators: IndicatorPins,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServoPins {
    pub chip: u32,
    pub channel: u32,
    #[serde(default = "default_period_ns")]
    pub period_ns: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorPins {
    pub granted_gpio: u32,
    pub denied_gpio: u32,
}

fn default_period_ns() -> u64 {
    crate::servo::DEFAULT_PERIOD_NS
}

fn board_db() -> &'static Vec<BoardProfile> {
    BOARD_DB.get_or_init(|| {
        let mut db = Vec::new();
        for src in [BOARD_RPI4] {
            match toml::from_str::<BoardProfile>(src) {
                Ok(b) => db.push(b),
                Err(e) => tracing::warn!(error = %e, "bad board profile TOML"),
            }
        }
        db
    })
}

/// Look up a board profile by name.
pub fn lookup_board(name: &str) -> Option<&'static BoardProfile> {
    board_db().iter().find(|b| b.board.name == name)
}

pub fn list_boards() -> &'static [BoardProfile] {
    board_db()
}
