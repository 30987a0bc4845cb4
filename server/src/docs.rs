//! API documentation: an OpenAPI document and a themed ReDoc page to render it.

use crate::{
    app::{DESCRIPTION, TITLE, VERSION},
    State,
};
use serde_json::{json, Map, Value};
use tide::{http::mime, Body, Request, Response, StatusCode};

const REDOC_JS_URL: &str = "https://cdn.jsdelivr.net/npm/redoc@next/bundles/redoc.standalone.js";
const REDOC_FAVICON_URL: &str = "/favicon.png";
const LOGO_URL: &str = "https://www.nowcasting.io/nowcasting.svg";

/// A documented route: path, tag, summary, and query parameters.
struct RouteDoc {
    path: &'static str,
    tag: &'static str,
    summary: &'static str,
    params: &'static [(&'static str, &'static str, &'static str)],
}

const FORECAST_PARAMS: &[(&str, &str, &str)] = &[
    ("historic", "boolean", "Include yesterday's forecasts as well as today's"),
    (
        "only_forecast_values",
        "boolean",
        "Return only forecast values, without system details",
    ),
    (
        "forecast_horizon_minutes",
        "integer",
        "Return the latest values forecast at least this many minutes before their target time",
    ),
];

const REGIME_PARAMS: &[(&str, &str, &str)] =
    &[("regime", "string", "Either `in-day` or `day-after`")];

const ROUTES: &[RouteDoc] = &[
    RouteDoc {
        path: "/",
        tag: "info",
        summary: "Get basic information about the Nowcasting API",
        params: &[],
    },
    RouteDoc {
        path: "/v0/solar/GB/national/forecast",
        tag: "national",
        summary: "Get the latest national solar forecast",
        params: FORECAST_PARAMS,
    },
    RouteDoc {
        path: "/v0/solar/GB/national/pvlive",
        tag: "national",
        summary: "Get national PV_Live values for yesterday and today",
        params: REGIME_PARAMS,
    },
    RouteDoc {
        path: "/v0/solar/GB/gsp/forecast/all",
        tag: "gsp",
        summary: "Get the latest forecasts for all GSPs",
        params: &[("historic", "boolean", "Include yesterday's forecasts as well as today's")],
    },
    RouteDoc {
        path: "/v0/solar/GB/gsp/forecast/{gsp_id}",
        tag: "gsp",
        summary: "Get the latest forecast for a specific GSP",
        params: FORECAST_PARAMS,
    },
    RouteDoc {
        path: "/v0/solar/GB/gsp/pvlive/all",
        tag: "gsp",
        summary: "Get PV_Live values for all GSPs for yesterday and today",
        params: REGIME_PARAMS,
    },
    RouteDoc {
        path: "/v0/solar/GB/gsp/pvlive/{gsp_id}",
        tag: "gsp",
        summary: "Get PV_Live values for a specific GSP for yesterday and today",
        params: REGIME_PARAMS,
    },
    RouteDoc {
        path: "/v0/solar/GB/status",
        tag: "status",
        summary: "Get the status of the forecast service",
        params: &[],
    },
    RouteDoc {
        path: "/v0/system/GB/gsp",
        tag: "system",
        summary: "Get details of all GSPs, or a specific GSP",
        params: &[("gsp_id", "integer", "Only return this GSP")],
    },
];

impl RouteDoc {
    fn operation(&self) -> Value {
        let mut params = self
            .params
            .iter()
            .map(|(name, ty, description)| {
                json!({
                    "name": name,
                    "in": "query",
                    "required": false,
                    "description": description,
                    "schema": { "type": ty },
                })
            })
            .collect::<Vec<_>>();
        if self.path.contains("{gsp_id}") {
            params.insert(
                0,
                json!({
                    "name": "gsp_id",
                    "in": "path",
                    "required": true,
                    "schema": { "type": "integer" },
                }),
            );
        }
        json!({
            "get": {
                "tags": [self.tag],
                "summary": self.summary,
                "parameters": params,
                "responses": {
                    "200": {
                        "description": "Successful Response",
                        "content": { "application/json": {} },
                    },
                },
            },
        })
    }
}

/// The OpenAPI document describing the API.
pub fn openapi_document() -> Value {
    let paths = ROUTES
        .iter()
        .map(|route| (route.path.to_string(), route.operation()))
        .collect::<Map<_, _>>();
    json!({
        "openapi": "3.0.2",
        "info": {
            "title": TITLE,
            "version": VERSION,
            "description": DESCRIPTION,
            "contact": {
                "name": "Open Climate Fix",
                "url": "https://openclimatefix.org",
                "email": "info@openclimatefix.org",
            },
            "license": {
                "name": "MIT License",
                "url": "https://github.com/openclimatefix/nowcasting_api/blob/main/LICENSE",
            },
            "x-logo": { "url": LOGO_URL },
        },
        "paths": paths,
    })
}

pub async fn openapi(_req: Request<State>) -> tide::Result<Body> {
    Body::from_json(&openapi_document())
}

/// The ReDoc theme, in Open Climate Fix colours.
fn theme() -> Value {
    json!({
        "colors": {
            "primary": { "main": "#f7ba17", "light": "#ffefc6" },
            "success": {
                "main": "rgba(28, 184, 65, 1)",
                "light": "#81ec9a",
                "dark": "#083312",
                "contrastText": "#000",
            },
            "text": { "primary": "#14120e", "secondary": "#4d4d4d" },
            "http": {
                "get": "#f7ba17",
                "post": "rgba(28, 184, 65, 1)",
                "put": "rgba(255, 187, 0, 1)",
                "delete": "rgba(254, 39, 35, 1)",
            },
        },
        "typography": {
            "fontSize": "15px",
            "fontFamily": "Inter, sans-serif",
            "lineHeight": "1.5em",
            "headings": {
                "fontFamily": "Inter, sans-serif",
                "fontWeight": "bold",
                "lineHeight": "1.5em",
            },
            "code": { "fontWeight": "600", "color": "rgba(92, 62, 189, 1)", "wrap": true },
            "links": { "color": "#086788", "visited": "#086788", "hover": "#32343a" },
        },
        "sidebar": { "width": "300px", "textColor": "#000000" },
        "logo": { "gutter": "10px" },
        "rightPanel": { "backgroundColor": "rgba(55, 53, 71, 1)", "textColor": "#ffffff" },
    })
}

/// Render a ReDoc page for the OpenAPI document at `openapi_url`.
pub fn redoc_page(title: &str, openapi_url: &str, with_google_fonts: bool) -> String {
    let fonts = if with_google_fonts {
        r#"<link href="https://fonts.googleapis.com/css?family=Inter:300,400,700" rel="stylesheet">"#
    } else {
        ""
    };
    let options = json!({ "theme": theme() });
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>{title}</title>
<!-- needed for adaptive design -->
<meta charset="utf-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1">
{fonts}
<link rel="shortcut icon" href="{REDOC_FAVICON_URL}">
<style>
  body {{
    margin: 0;
    padding: 0;
  }}
</style>
</head>
<body>
<div id="redoc-container"></div>
<noscript>
    ReDoc requires Javascript to function. Please enable it to browse the documentation.
</noscript>
<script src="{REDOC_JS_URL}"> </script>
<script>
    Redoc.init("{openapi_url}", {options}, document.getElementById('redoc-container'))
</script>
</body>
</html>
"#
    )
}

pub async fn redoc_html(_req: Request<State>) -> tide::Result<Response> {
    Ok(Response::builder(StatusCode::Ok)
        .body(redoc_page(TITLE, "./openapi.json", true))
        .content_type(mime::HTML)
        .build())
}
