//! HTML rendering
//!
//! Every page shares one layout: a header with the login/logout button and
//! the user's avatar and name, and a single content region. Strings that
//! come from the API are escaped before they are interpolated.

use std::fmt::Write;

use now_playing::NowPlaying;
use spotify_api::{Page, Playlist, PlaylistItem, UserProfile};

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Header content for the current auth state.
pub enum Header<'a> {
    LoggedOut,
    LoggedIn(&'a UserProfile),
}

/// Wrap `content` in the page layout. `refresh_secs` drives the client-side
/// refresh of the now-playing fragment; `None` disables the script.
pub fn layout(header: Header<'_>, content: &str, refresh_secs: Option<u64>) -> String {
    let (action, label, identity) = match header {
        Header::LoggedOut => ("/login", "Login with Spotify", String::new()),
        Header::LoggedIn(profile) => {
            let mut identity = String::new();
            if let Some(image) = profile.avatar() {
                let _ = write!(
                    identity,
                    r#"<span id="avatar"><img src="{}" alt="avatar" width="64" /></span>"#,
                    escape(&image.url)
                );
            }
            let _ = write!(
                identity,
                r#"<span id="displayName">{}</span>"#,
                escape(profile.name())
            );
            ("/logout", "Logout", identity)
        }
    };

    let script = refresh_secs
        .map(|secs| NOW_PLAYING_SCRIPT.replace("__REFRESH_MS__", &(secs * 1000).to_string()))
        .unwrap_or_default();

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8" />
<title>Spotify</title>
</head>
<body>
<header>
<form method="post" action="{action}"><button id="login-btn" type="submit">{label}</button></form>
{identity}
</header>
<main id="content">
{content}
</main>
{script}
</body>
</html>
"#
    )
}

/// Reports page visibility and re-reads the now-playing fragment while the
/// page is shown.
const NOW_PLAYING_SCRIPT: &str = r#"<script>
(function () {
  const fragment = () => document.getElementById('now-playing');
  async function refresh() {
    const el = fragment();
    if (!el || document.hidden) return;
    try {
      const resp = await fetch('/now-playing');
      if (resp.ok) el.innerHTML = await resp.text();
    } catch (err) {
      console.warn('now-playing refresh failed', err);
    }
  }
  document.addEventListener('visibilitychange', () => {
    fetch('/visibility', {
      method: 'POST',
      headers: { 'content-type': 'application/x-www-form-urlencoded' },
      body: 'visible=' + !document.hidden,
    }).then(() => { if (!document.hidden) refresh(); });
  });
  setInterval(refresh, __REFRESH_MS__);
})();
</script>"#;

pub fn logged_out(notice: Option<&str>) -> String {
    let mut html = String::new();
    if let Some(notice) = notice {
        let _ = write!(html, r#"<p class="notice">{}</p>"#, escape(notice));
    }
    html.push_str("<p>Please log in to see your playlists and current track.</p>");
    layout(Header::LoggedOut, &html, None)
}

/// Logged-in landing page: playlists plus the now-playing fragment.
pub fn dashboard(
    profile: &UserProfile,
    playlists: &Page<Playlist>,
    now_playing: &NowPlaying,
    refresh_secs: u64,
) -> String {
    let mut html = String::from("<h3>Your Playlists</h3>\n<ul>\n");
    for playlist in &playlists.items {
        let _ = writeln!(
            html,
            r#"<li><a class="playlist-btn" href="/playlists/{}">{} ({})</a></li>"#,
            escape(&playlist.id),
            escape(&playlist.name),
            playlist.tracks.total
        );
    }
    html.push_str("</ul>\n<h3>Currently Playing</h3>\n");
    let _ = write!(
        html,
        r#"<div id="now-playing">{}</div>"#,
        now_playing_fragment(now_playing)
    );
    html.push_str(concat!(
        "\n<div id=\"player\">",
        r#"<form method="post" action="/player/play"><button type="submit">Play</button></form>"#,
        r#"<form method="post" action="/player/pause"><button type="submit">Pause</button></form>"#,
        "</div>"
    ));
    layout(Header::LoggedIn(profile), &html, Some(refresh_secs))
}

/// Track list for one playlist, with a way back to the dashboard.
pub fn tracks(profile: &UserProfile, items: &Page<PlaylistItem>) -> String {
    let mut html = String::from("<p><a href=\"/\">Back to playlists</a></p>\n<h4>Tracks</h4>\n<ol>\n");
    for item in &items.items {
        match &item.track {
            Some(track) => {
                let _ = writeln!(
                    html,
                    "<li>{} \u{2014} {}</li>",
                    escape(&track.name),
                    escape(&track.artist_names())
                );
            }
            None => html.push_str("<li><em>Unavailable track</em></li>\n"),
        }
    }
    html.push_str("</ol>");
    layout(Header::LoggedIn(profile), &html, None)
}

/// Inner HTML of the `now-playing` region.
pub fn now_playing_fragment(now: &NowPlaying) -> String {
    let current = match now {
        NowPlaying::Unknown => return "<p>Loading\u{2026}</p>".to_string(),
        NowPlaying::Nothing => return "<p>Nothing is currently playing.</p>".to_string(),
        NowPlaying::Playing(current) => current,
    };
    let Some(item) = &current.item else {
        return "<p>Nothing is currently playing.</p>".to_string();
    };

    let mut html = String::from("<div>");
    if let Some(image) = item.album.as_ref().and_then(|album| album.thumbnail()) {
        let _ = write!(html, r#"<img src="{}" width="64" />"#, escape(&image.url));
    }
    let _ = write!(html, "<strong>{}</strong>", escape(&item.name));
    let artists = item.artist_names();
    if !artists.is_empty() {
        let _ = write!(html, " \u{2014} {}", escape(&artists));
    }
    if let Some(album) = &item.album {
        let _ = write!(html, " <em>on {}</em>", escape(&album.name));
    }
    if !current.is_playing {
        html.push_str(" (paused)");
    }
    html.push_str("</div>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotify_api::CurrentlyPlaying;

    fn profile(json: &str) -> UserProfile {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn escape_replaces_markup() {
        assert_eq!(
            escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn logged_out_page_offers_login() {
        let html = logged_out(Some("Login failed <oops>"));
        assert!(html.contains(r#"action="/login""#));
        assert!(html.contains("Login with Spotify"));
        assert!(html.contains("Please log in"));
        assert!(html.contains("Login failed &lt;oops&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn dashboard_lists_playlists_and_escapes_names() {
        let me = profile(
            r#"{"id":"u1","display_name":"Ann <3","images":[{"url":"https://i/a.png"}]}"#,
        );
        let playlists: Page<Playlist> = serde_json::from_str(
            r#"{"items":[{"id":"p1","name":"Rock & Roll","tracks":{"total":12}}],"next":null}"#,
        )
        .unwrap();

        let html = dashboard(&me, &playlists, &NowPlaying::Nothing, 10);
        assert!(html.contains(r#"action="/logout""#));
        assert!(html.contains("Ann &lt;3"));
        assert!(html.contains(r#"src="https://i/a.png""#));
        assert!(html.contains(r#"href="/playlists/p1""#));
        assert!(html.contains("Rock &amp; Roll (12)"));
        assert!(html.contains("Nothing is currently playing."));
        assert!(html.contains("setInterval(refresh, 10000)"));
    }

    #[test]
    fn tracks_page_has_back_link_and_handles_missing_tracks() {
        let me = profile(r#"{"id":"u1"}"#);
        let items: Page<PlaylistItem> = serde_json::from_str(
            r#"{"items":[{"track":{"name":"Song","artists":[{"name":"A"},{"name":"B"}]}},{"track":null}],"next":null}"#,
        )
        .unwrap();

        let html = tracks(&me, &items);
        assert!(html.contains(r#"<a href="/">Back to playlists</a>"#));
        assert!(html.contains("<li>Song \u{2014} A, B</li>"));
        assert!(html.contains("Unavailable track"));
        assert!(html.contains(r#"<span id="displayName">u1</span>"#));
    }

    #[test]
    fn now_playing_fragment_variants() {
        assert!(now_playing_fragment(&NowPlaying::Unknown).contains("Loading"));
        assert!(now_playing_fragment(&NowPlaying::Nothing).contains("Nothing is currently"));

        let current: CurrentlyPlaying = serde_json::from_str(
            r#"{"is_playing":false,"progress_ms":1,"item":{"name":"Song","artists":[{"name":"A"}],"album":{"name":"LP","images":[{"url":"big"},{"url":"mid"},{"url":"small"}]}}}"#,
        )
        .unwrap();
        let html = now_playing_fragment(&NowPlaying::Playing(current));
        assert!(html.contains(r#"<img src="small" width="64" />"#));
        assert!(html.contains("<strong>Song</strong> \u{2014} A <em>on LP</em>"));
        assert!(html.contains("(paused)"));
    }
}
