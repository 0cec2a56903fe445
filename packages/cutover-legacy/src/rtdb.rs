use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, header};
use serde_json::{Map, Value};

use crate::{BoxFuture, Error, EventStream, Result, TreeStore};

const ERROR_BODY_LIMIT: usize = 4_096;

/// REST client for the legacy realtime database: `{base_url}/{path}.json`.
#[derive(Clone)]
pub struct RtdbClient {
	client: Client,
	base_url: String,
	auth_token: Option<String>,
	timeout: Duration,
}
impl RtdbClient {
	pub fn new(cfg: &cutover_config::Legacy) -> Result<Self> {
		let timeout = Duration::from_millis(cfg.timeout_ms);
		// No client-wide timeout: it would also bound the lifetime of the event stream.
		let client = Client::builder().connect_timeout(timeout).build()?;

		Ok(Self {
			client,
			base_url: cfg.base_url.clone(),
			auth_token: cfg.auth_token.clone(),
			timeout,
		})
	}

	pub fn url(&self, path: &str) -> String {
		let path = path.trim_matches('/');

		if path.is_empty() {
			format!("{}/.json", self.base_url)
		} else {
			format!("{}/{path}.json", self.base_url)
		}
	}

	/// Opens a live subscription rooted at `path`.
	pub async fn open_stream(&self, path: &str) -> Result<EventStream> {
		tracing::info!(path, "Opening legacy change stream.");

		let res = self
			.authorize(self.client.get(self.url(path)))
			.header(header::ACCEPT, "text/event-stream")
			.send()
			.await?;

		Ok(EventStream::new(check_status(res).await?))
	}

	fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
		match self.auth_token.as_deref() {
			Some(token) => req.query(&[("auth", token)]),
			None => req,
		}
	}

	async fn send(&self, req: RequestBuilder) -> Result<Response> {
		let res = self.authorize(req).timeout(self.timeout).send().await?;

		check_status(res).await
	}

	async fn get_inner(&self, path: &str) -> Result<Value> {
		let res = self.send(self.client.get(self.url(path))).await?;

		Ok(res.json().await?)
	}

	async fn child_keys_inner(&self, path: &str) -> Result<Vec<String>> {
		let res = self.send(self.client.get(self.url(path)).query(&[("shallow", "true")])).await?;
		let node: Value = res.json().await?;

		Ok(node.as_object().map(|map| map.keys().cloned().collect()).unwrap_or_default())
	}

	async fn set_inner(&self, path: &str, value: &Value) -> Result<()> {
		self.send(self.client.put(self.url(path)).query(&[("print", "silent")]).json(value))
			.await?;

		Ok(())
	}

	async fn update_inner(&self, path: &str, fields: &Map<String, Value>) -> Result<()> {
		self.send(self.client.patch(self.url(path)).query(&[("print", "silent")]).json(fields))
			.await?;

		Ok(())
	}

	async fn delete_inner(&self, path: &str) -> Result<()> {
		self.send(self.client.delete(self.url(path))).await?;

		Ok(())
	}
}

impl TreeStore for RtdbClient {
	fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Value>> {
		Box::pin(self.get_inner(path))
	}

	fn child_keys<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(self.child_keys_inner(path))
	}

	fn set<'a>(&'a self, path: &'a str, value: &'a Value) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.set_inner(path, value))
	}

	fn update<'a>(
		&'a self,
		path: &'a str,
		fields: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.update_inner(path, fields))
	}

	fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.delete_inner(path))
	}
}

async fn check_status(res: Response) -> Result<Response> {
	let status = res.status();

	if status.is_success() {
		return Ok(res);
	}

	let mut body = res.text().await.unwrap_or_default();

	if body.len() > ERROR_BODY_LIMIT {
		let mut cut = ERROR_BODY_LIMIT;

		while !body.is_char_boundary(cut) {
			cut -= 1;
		}

		body.truncate(cut);
	}

	tracing::warn!(status = status.as_u16(), "Legacy store rejected a request.");

	Err(Error::Status { status: status.as_u16(), body: body.trim().to_string() })
}
