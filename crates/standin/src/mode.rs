// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Session modes.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// How eagerly a session goes to the origin.
///
/// Modes are ordered from least to most origin traffic, so capping a mode is taking the
/// minimum: `Mode::Freshen.min(Mode::Online)` is `Online`.
///
/// # Examples
///
/// ```
/// use standin::Mode;
///
/// let mode: Mode = "Online".parse()?;
/// assert_eq!(mode, Mode::Online);
/// assert_eq!(mode.to_string(), "online");
/// assert!(Mode::Offline < Mode::Freshen);
/// # Ok::<(), standin::ParseModeError>(())
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Serve from the cache only. Anything never cached fails with
    /// [`Error::OfflineMiss`](crate::Error::OfflineMiss).
    Offline,
    /// Serve cached data when it exists, fetch and cache everything else.
    #[default]
    Online,
    /// Fetch everything from the origin once per session and refresh the cache with it.
    Freshen,
}

impl Mode {
    /// Applies an optional cap, returning the lower of the two modes.
    #[must_use]
    pub fn capped(self, cap: Option<Self>) -> Self {
        cap.map_or(self, |cap| self.min(cap))
    }

    /// The lowercase name of the mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Freshen => "freshen",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned when parsing an unknown [`Mode`] name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode {0:?}, expected one of offline, online, freshen")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Offline, Self::Online, Self::Freshen]
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseModeError(s.to_owned()))
    }
}
