//! Static descriptors for every user-facing toggle and guarded feature.
//!
//! Whether a toggle is friction-guarded is a property of its descriptor, read
//! once, rather than something inferred from its id at click time.

use std::fmt;
use std::str::FromStr;

use crate::error::XtabError;
use crate::FeatureKey;

/// Shared across features: the calendar date of the last disable attempt.
pub const LAST_ATTEMPT_DATE_KEY: &str = "lastAttemptDate";

/// Storage layout and copy for one guarded feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDescriptor {
    pub key: FeatureKey,
    pub enabled_key: &'static str,
    pub snooze_end_key: &'static str,
    pub attempts_key: &'static str,
    /// Reserved alarm name; at most one alarm per name is ever pending.
    pub alarm_name: &'static str,
    pub label: &'static str,
    pub confirm_title: &'static str,
    pub confirm_message: &'static str,
}

// Home keys carry no prefix; they predate the explore feature.
const HOME: FeatureDescriptor = FeatureDescriptor {
    key: FeatureKey::Home,
    enabled_key: "homeRedirect",
    snooze_end_key: "snoozeEndTime",
    attempts_key: "disableAttempts",
    alarm_name: "homeSnoozeExpired",
    label: "Home Redirect",
    confirm_title: "Disable Home Redirect?",
    confirm_message: "The Home Redirect feature helps maintain your focus by redirecting you to \
        your bookmarks instead of distracting social feeds. Are you sure you want to disable \
        this productivity feature?",
};

const EXPLORE: FeatureDescriptor = FeatureDescriptor {
    key: FeatureKey::Explore,
    enabled_key: "exploreRedirect",
    snooze_end_key: "exploreSnoozeEndTime",
    attempts_key: "exploreDisableAttempts",
    alarm_name: "exploreSnoozeExpired",
    label: "Explore Redirect",
    confirm_title: "Disable Explore Redirect?",
    confirm_message: "The Explore Redirect feature helps maintain your focus by redirecting you \
        away from trending content and discovery feeds. Are you sure you want to disable this \
        productivity feature?",
};

impl FeatureDescriptor {
    pub fn of(key: FeatureKey) -> &'static FeatureDescriptor {
        match key {
            FeatureKey::Home => &HOME,
            FeatureKey::Explore => &EXPLORE,
        }
    }

    /// Maps a fired alarm back to its feature.
    pub fn for_alarm(name: &str) -> Option<&'static FeatureDescriptor> {
        [&HOME, &EXPLORE]
            .into_iter()
            .find(|descriptor| descriptor.alarm_name == name)
    }
}

/// Every option shown in the settings UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Toggle {
    /// Open post links in a background tab.
    Posts,
    /// Open the notifications link in a background tab.
    Notifications,
    HomeRedirect,
    ExploreRedirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleDescriptor {
    pub toggle: Toggle,
    pub storage_key: &'static str,
    pub label: &'static str,
    pub default_enabled: bool,
    pub requires_friction: bool,
    pub guards: Option<FeatureKey>,
}

pub const TOGGLES: [ToggleDescriptor; 4] = [
    ToggleDescriptor {
        toggle: Toggle::Posts,
        storage_key: "posts",
        label: "Open posts in background tab",
        default_enabled: true,
        requires_friction: false,
        guards: None,
    },
    ToggleDescriptor {
        toggle: Toggle::Notifications,
        storage_key: "notifications",
        label: "Open notifications in background tab",
        default_enabled: true,
        requires_friction: false,
        guards: None,
    },
    ToggleDescriptor {
        toggle: Toggle::HomeRedirect,
        storage_key: "homeRedirect",
        label: "Home Redirect",
        default_enabled: false,
        requires_friction: true,
        guards: Some(FeatureKey::Home),
    },
    ToggleDescriptor {
        toggle: Toggle::ExploreRedirect,
        storage_key: "exploreRedirect",
        label: "Explore Redirect",
        default_enabled: false,
        requires_friction: true,
        guards: Some(FeatureKey::Explore),
    },
];

impl Toggle {
    pub const ALL: [Toggle; 4] = [
        Toggle::Posts,
        Toggle::Notifications,
        Toggle::HomeRedirect,
        Toggle::ExploreRedirect,
    ];

    pub fn descriptor(self) -> &'static ToggleDescriptor {
        match self {
            Toggle::Posts => &TOGGLES[0],
            Toggle::Notifications => &TOGGLES[1],
            Toggle::HomeRedirect => &TOGGLES[2],
            Toggle::ExploreRedirect => &TOGGLES[3],
        }
    }

    pub fn for_feature(key: FeatureKey) -> Toggle {
        match key {
            FeatureKey::Home => Toggle::HomeRedirect,
            FeatureKey::Explore => Toggle::ExploreRedirect,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Toggle::Posts => "posts",
            Toggle::Notifications => "notifications",
            Toggle::HomeRedirect => "home",
            Toggle::ExploreRedirect => "explore",
        }
    }
}

impl ToggleDescriptor {
    /// New checked state after a click on the option row (not the switch).
    ///
    /// Guarded toggles can be switched on this way but never off; `None`
    /// means the click is ignored.
    pub fn area_click(&self, checked: bool) -> Option<bool> {
        if self.requires_friction {
            (!checked).then_some(true)
        } else {
            Some(!checked)
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Toggle {
    type Err = XtabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "posts" => Ok(Toggle::Posts),
            "notifications" => Ok(Toggle::Notifications),
            "home" | "homeRedirect" => Ok(Toggle::HomeRedirect),
            "explore" | "exploreRedirect" => Ok(Toggle::ExploreRedirect),
            other => Err(XtabError::UnknownToggle(other.to_string())),
        }
    }
}
