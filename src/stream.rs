//! Status-aware stream multiplexing
//!
//! Transport protocols commit a status code before the first body byte, yet
//! whether an LLM invocation "succeeded" is often only known after observing
//! its output (a content-filter rejection arrives inside the stream, not as
//! an upfront error). [`negotiate`] buffers just enough of the `(content,
//! status)` stream to decide the one committed status, then degrades to
//! body-only signalling: a late non-2xx element truncates the body without
//! touching the status line.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};

/// Response header carrying the session identifier out of band
pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// A stream whose status has been committed
///
/// The body always ends with exactly one empty closing frame.
pub struct Negotiated {
    /// The committed outbound status
    pub status: u16,
    /// Body fragments followed by one empty closing frame
    pub body: BoxStream<'static, Bytes>,
}

enum BodyState<S> {
    /// Committed first chunk still to emit, then the rest of the stream
    First(String, S),
    /// Relaying the remainder of the stream
    Streaming(S),
    /// Nothing to relay; only the closing frame remains
    Closing,
    /// Closing frame emitted
    Done,
}

/// Decides the outbound status from a lazy `(content, status)` sequence
///
/// Consumes elements until one has non-empty content (its status is
/// committed and it becomes the first body fragment) or one has empty
/// content with a non-2xx status (that status is committed with an empty
/// body). An exhausted sequence commits 200 with an empty body.
///
/// After commitment, each element is relayed as a body fragment unless its
/// status is non-2xx, in which case the body is closed early; the committed
/// status never changes. Dropping the body stops pulling from upstream.
///
/// # Examples
///
/// ```
/// use futures::{stream, StreamExt};
/// use parley::stream::negotiate;
///
/// # tokio_test::block_on(async {
/// let reply = negotiate(stream::iter(vec![
///     ("hello".to_string(), 200u16),
///     ("world".to_string(), 200u16),
/// ]))
/// .await;
/// assert_eq!(reply.status, 200);
/// let frames: Vec<_> = reply.body.collect().await;
/// assert_eq!(frames.len(), 3); // two fragments plus the closing frame
/// # });
/// ```
pub async fn negotiate<S>(upstream: S) -> Negotiated
where
    S: Stream<Item = (String, u16)> + Send + 'static,
{
    let mut upstream = Box::pin(upstream);
    let mut state = BodyState::Closing;
    let mut status: Option<u16> = None;

    while let Some((content, chunk_status)) = upstream.next().await {
        if !content.is_empty() {
            // Only the first non-empty chunk fixes the status.
            status = Some(chunk_status);
            state = BodyState::First(content, upstream);
            break;
        }
        if !is_success(chunk_status) {
            status = Some(chunk_status);
            break;
        }
    }

    Negotiated {
        status: status.unwrap_or(200),
        body: body_stream(state),
    }
}

fn body_stream<S>(state: BodyState<S>) -> BoxStream<'static, Bytes>
where
    S: Stream<Item = (String, u16)> + Send + Unpin + 'static,
{
    stream::unfold(state, |state| async move {
        match state {
            BodyState::First(content, rest) => {
                Some((Bytes::from(content), BodyState::Streaming(rest)))
            }
            BodyState::Streaming(mut rest) => match rest.next().await {
                Some((_, chunk_status)) if !is_success(chunk_status) => {
                    // Headers are long gone; the late failure is observable
                    // only as body truncation.
                    Some((Bytes::new(), BodyState::Done))
                }
                Some((content, _)) => Some((Bytes::from(content), BodyState::Streaming(rest))),
                None => Some((Bytes::new(), BodyState::Done)),
            },
            BodyState::Closing => Some((Bytes::new(), BodyState::Done)),
            BodyState::Done => None,
        }
    })
    .boxed()
}

/// An outbound streaming reply with its session identifier
///
/// Axum adapter over a [`Negotiated`] stream: commits the status, attaches
/// the [`CONVERSATION_ID_HEADER`], then streams the body fragments.
pub struct StreamedReply {
    conversation_id: String,
    negotiated: Negotiated,
}

impl StreamedReply {
    /// Wraps a negotiated stream for the given conversation
    pub fn new(conversation_id: impl Into<String>, negotiated: Negotiated) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            negotiated,
        }
    }
}

impl IntoResponse for StreamedReply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.negotiated.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Body::from_stream(
            self.negotiated
                .body
                .map(Ok::<_, std::convert::Infallible>),
        );
        let mut response = Response::new(body);
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        if let Ok(value) = header::HeaderValue::from_str(&self.conversation_id) {
            response.headers_mut().insert(CONVERSATION_ID_HEADER, value);
        }
        response
    }
}
