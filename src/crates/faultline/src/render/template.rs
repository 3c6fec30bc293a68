//! Error page templates
//!
//! The debug page is rendered through a [`TemplateEngine`]; the default
//! engine is handlebars with an extra `inspect` helper that prints a value
//! as JSON.

use handlebars::{handlebars_helper, Handlebars};

use crate::{FaultlineError, Result};

/// Renders a template string against a JSON context
pub trait TemplateEngine: Send + Sync {
    /// Render `template` with `data` as its context
    fn render(&self, template: &str, data: &serde_json::Value) -> Result<String>;
}

handlebars_helper!(inspect: |value: Json| value.to_string());

/// Handlebars-backed template engine
#[derive(Debug)]
pub struct HandlebarsEngine {
    registry: Handlebars<'static>,
}

impl HandlebarsEngine {
    /// Create an engine with the `inspect` helper registered
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_helper("inspect", Box::new(inspect));
        Self { registry }
    }
}

impl Default for HandlebarsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for HandlebarsEngine {
    fn render(&self, template: &str, data: &serde_json::Value) -> Result<String> {
        self.registry
            .render_template(template, data)
            .map_err(|e| FaultlineError::Template(e.to_string()))
    }
}

/// Debug page shown outside production
///
/// Context: `status`, `errors` (display records, oldest first), `data`
/// (request key/value context) and `routes`.
pub const DEV_ERROR_TEMPLATE: &str = r#"
<html>
<head>
	<title>{{status}} - ERROR!</title>
	<style>
		body {
			font-family: helvetica;
		}
		table {
			width: 100%;
		}
		th {
			text-align: left;
		}
		tr:nth-child(even) {
		  background-color: #dddddd;
		}
		td {
			margin: 0px;
			padding: 10px;
		}
		pre {
			display: block;
			padding: 9.5px;
			margin: 0 0 10px;
			font-size: 13px;
			line-height: 1.42857143;
			color: #333;
			word-break: break-all;
			word-wrap: break-word;
			background-color: #f5f5f5;
			border: 1px solid #ccc;
			border-radius: 4px;
		}
	</style>
</head>
<body>
<h1>{{status}} - ERROR!</h1>
{{#each errors as |error|}}
<pre>{{ error.Msg }}</pre>
{{#if error.HasStack }}
<pre>{{ error.Stack }}</pre>
{{/if}}
{{/each}}
<hr>
<h3>Context</h3>
<pre>{{#each data as |value key|}}
{{inspect key}}: {{inspect value}}
{{/each}}</pre>
<hr>
<h3>Routes</h3>
<table id="faultline-routes-table">
	<thead>
		<tr>
			<th>METHOD</th>
			<th>PATH</th>
			<th>HANDLER</th>
		</tr>
	</thead>
	<tbody>
		{{#each routes as |route|}}
			<tr>
				<td>{{route.Method}}</td>
				<td>{{route.Path}}</td>
				<td><code>{{route.HandlerName}}</code></td>
			</tr>
		{{/each}}
	</tbody>
</table>
</body>
</html>
"#;

/// Generic page shown in production; never contains error details
pub const PROD_ERROR_TEMPLATE: &str = r#"
<h1>We're Sorry!</h1>
<p>
It looks like something went wrong! Don't worry, we are aware of the problem and are looking into it.
</p>
<p>
Sorry if this has caused you any problems. Please check back again later.
</p>
"#;
