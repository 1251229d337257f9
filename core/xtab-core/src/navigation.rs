//! Page navigation rules: which URLs get redirected and which links open in a
//! background tab. Pure functions over URLs and cached settings.

use url::Url;

use crate::settings_cache::SettingsCache;
use crate::FeatureKey;

pub const SITE_ORIGIN: &str = "https://x.com";
pub const REDIRECT_TARGET: &str = "https://x.com/i/bookmarks";

const NOTIFICATIONS_TEST_ID: &str = "AppTabBar_Notifications_Link";

/// Resolves `href` against the site origin. Relative paths are accepted.
fn resolve(href: &str) -> Option<Url> {
    let base = Url::parse(SITE_ORIGIN).ok()?;
    base.join(href.trim()).ok()
}

fn on_site(url: &Url) -> bool {
    url.scheme() == "https" && url.host_str() == Some("x.com") && url.port().is_none()
}

pub fn is_home_url(href: &str) -> bool {
    resolve(href)
        .map(|url| on_site(&url) && matches!(url.path(), "/home" | "/home/"))
        .unwrap_or(false)
}

pub fn is_explore_url(href: &str) -> bool {
    resolve(href)
        .map(|url| on_site(&url) && url.path().starts_with("/explore"))
        .unwrap_or(false)
}

/// Which guarded feature, if any, covers this page.
pub fn guarded_feature(href: &str) -> Option<FeatureKey> {
    if is_home_url(href) {
        Some(FeatureKey::Home)
    } else if is_explore_url(href) {
        Some(FeatureKey::Explore)
    } else {
        None
    }
}

/// Where to send the browser instead of `href`, if its redirect is on.
pub fn redirect_target(href: &str, settings: &SettingsCache) -> Option<&'static str> {
    guarded_feature(href)
        .filter(|feature| settings.redirect_enabled(*feature))
        .map(|_| REDIRECT_TARGET)
}

/// A post permalink: the link targets a status and wraps a timestamp.
pub fn is_post_link(href: &str, has_time: bool) -> bool {
    has_time && href.contains("/status/")
}

pub fn is_notifications_link(href: &str, test_id: Option<&str>) -> bool {
    href.contains("/notifications") && test_id == Some(NOTIFICATIONS_TEST_ID)
}

/// Absolute URL for the notifications link; relative hrefs are on-site.
pub fn notifications_link_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", SITE_ORIGIN, href)
    }
}

/// URL to open in a background tab for a clicked link, if interception is on.
pub fn background_tab_url(
    href: &str,
    has_time: bool,
    test_id: Option<&str>,
    settings: &SettingsCache,
) -> Option<String> {
    if settings.posts_enabled() && is_post_link(href, has_time) {
        return resolve(href).map(String::from);
    }
    if settings.notifications_enabled() && is_notifications_link(href, test_id) {
        return Some(notifications_link_url(href));
    }
    None
}
