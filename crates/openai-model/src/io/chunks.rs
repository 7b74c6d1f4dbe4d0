#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// The body stream broke before it was complete.
#[derive(Debug, PartialEq, Eq)]
pub struct Error;

/// A source of body chunks: a live HTTP response, or canned bytes in tests.
pub enum Chunks {
    Response(Response),
    #[cfg(test)]
    Canned(VecDeque<Bytes>),
}

impl Chunks {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub fn canned<I: IntoIterator<Item = &'static [u8]>>(parts: I) -> Self {
        Chunks::Canned(parts.into_iter().map(Bytes::from_static).collect())
    }

    /// Returns the next chunk, or `None` once the body is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|err| {
                    debug!("body stream failed: {err}");
                    Error
                })
            }
            #[cfg(test)]
            Chunks::Canned(parts) => Ok(parts.pop_front()),
        }
    }
}
