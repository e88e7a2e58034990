//! Locally predicted player pose with outbound change detection.

use shared::{DEFAULT_ANIM, SPAWN_X, SPAWN_Y};

/// The client's own player, simulated optimistically every tick.
///
/// The pose is updated from input without waiting for the server, and
/// [`take_update`](Self::take_update) hands out a payload only when
/// something changed since the last send, so per-tick callers do not
/// flood the wire. The server's echo of this player is never applied
/// back here.
#[derive(Debug, Clone)]
pub struct LocalPlayer {
    pub x: f32,
    pub y: f32,
    pub anim: String,
    last_sent: Option<(f32, f32, String)>,
}

impl LocalPlayer {
    pub fn new() -> Self {
        Self {
            x: SPAWN_X,
            y: SPAWN_Y,
            anim: DEFAULT_ANIM.to_string(),
            last_sent: None,
        }
    }

    /// Overwrites the pose from the simulation tick.
    pub fn set_pose(&mut self, x: f32, y: f32, anim: &str) {
        self.x = x;
        self.y = y;
        if self.anim != anim {
            self.anim = anim.to_string();
        }
    }

    /// Returns `(x, y, anim)` to send if the pose changed since the
    /// last send; `None` otherwise.
    pub fn take_update(&mut self) -> Option<(f32, f32, String)> {
        let current = (self.x, self.y, self.anim.clone());
        if self.last_sent.as_ref() == Some(&current) {
            return None;
        }
        self.last_sent = Some(current.clone());
        Some(current)
    }
}

impl Default for LocalPlayer {
    fn default() -> Self {
        Self::new()
    }
}
