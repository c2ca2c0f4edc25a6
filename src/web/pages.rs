//! Server-rendered HTML for the two views.

use anyhow::Result;
use std::fmt::Write;

use crate::map::MapView;
use crate::report::{IncidentType, Report};
use crate::stations::StationSet;

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, head: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="fr">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
{head}
</head>
<body>
<h1>🚆 RailRadar – Signalements collaboratifs</h1>
<nav><a href="/signaler">📩 Signaler</a> · <a href="/carte">🗺️ Carte des incidents</a></nav>
{body}
</body>
</html>"#,
        title = escape(title),
    )
}

/// The submission form; `stored` adds the confirmation banner.
pub fn report_form(stations: &StationSet, stored: Option<&Report>) -> String {
    let mut body = String::from("<h2>Signale un incident ou une anomalie</h2>\n");

    if stored.is_some() {
        body.push_str("<p class=\"success\">✅ Signalement transmis ! Merci 🙌</p>\n");
    }

    body.push_str("<form method=\"post\" action=\"/signaler\">\n");
    body.push_str(
        "<label>📍 Gare ou station concernée <input name=\"station\" list=\"stations\"></label><br>\n",
    );
    body.push_str("<label>🚇 Ligne <input name=\"line\"></label><br>\n");

    body.push_str("<label>🚧 Type d'incident <select name=\"incident_type\">\n");
    for t in IncidentType::ALL {
        let _ = writeln!(body, "<option>{}</option>", escape(t.label()));
    }
    body.push_str("</select></label><br>\n");

    body.push_str("<label>✏️ Commentaire <textarea name=\"comment\"></textarea></label><br>\n");
    body.push_str("<button type=\"submit\">Envoyer</button>\n</form>\n");

    body.push_str("<datalist id=\"stations\">\n");
    for station in stations.iter() {
        let _ = writeln!(body, "<option value=\"{}\">", escape(&station.name));
    }
    body.push_str("</datalist>\n");

    layout("RailRadar – Signaler", "", &body)
}

/// JSON safe to inline in a `<script>` element.
fn script_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

pub fn map_page(view: &MapView) -> Result<String> {
    let head = format!(
        "<link rel=\"stylesheet\" href=\"{LEAFLET_CSS}\">\n<script src=\"{LEAFLET_JS}\"></script>\n\
         <style>#map {{ width: 1000px; max-width: 100%; height: 600px; }}</style>"
    );

    let mut body = String::from("<h2>📍 Visualisation géographique des incidents</h2>\n");
    for warning in &view.warnings {
        let _ = writeln!(body, "<p class=\"warning\">⚠️ {}</p>", escape(warning));
    }

    let _ = write!(
        body,
        r#"<div id="map"></div>
<script>
const view = {view};
const esc = (s) => String(s).replace(/[&<>"']/g, (c) => ({{'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}})[c]);
const map = L.map('map').setView([view.center.lat, view.center.lon], view.zoom);
L.tileLayer(view.tiles.url, {{ attribution: view.tiles.attribution }}).addTo(map);
if (view.lines) {{
  L.geoJSON(view.lines, {{ style: (f) => ({{ color: (f.properties && f.properties.colourweb_hexa) ? '#' + f.properties.colourweb_hexa : '#3388ff', weight: 3 }}) }}).addTo(map);
}}
for (const s of view.stations) {{
  L.circleMarker([s.coordinates.lat, s.coordinates.lon], {{ radius: 3 }}).bindTooltip(esc(s.name)).addTo(map);
}}
for (const m of view.markers) {{
  let popup = `<b>${{esc(m.place)}}</b><br>${{esc(m.incident_type)}}<br>${{esc(m.comment)}}<br><small>${{esc(m.timestamp)}}</small>`;
  if (m.nearest_station) {{
    popup += `<br><small>Station la plus proche : ${{esc(m.nearest_station.name)}} (${{Math.round(m.nearest_station.distance_m)}} m)</small>`;
  }}
  L.marker([m.coordinates.lat, m.coordinates.lon]).bindPopup(popup).addTo(map);
}}
</script>
"#,
        view = script_json(view)?,
    );

    Ok(layout("RailRadar – Carte", &head, &body))
}
