//! [`Stream`] that converts a stream of byte chunks into [`Frame`]s.

use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use futures_util::Stream;

use super::{
    accumulator::{EventAccumulator, Frame},
    line::LineParser,
};

pin_project_lite::pin_project! {
    /// A [`Stream`] of parsed [`Frame`]s over an underlying byte stream.
    ///
    /// Frames are produced one line at a time, so a consumer that stops
    /// polling never has more than the current frame handed to it. When the
    /// underlying stream ends or fails, any event not yet closed by a blank
    /// line is dropped.
    #[project = EventStreamProjection]
    #[derive(Debug)]
    pub struct EventStream<S> {
        #[pin]
        stream: S,
        lines: LineParser,
        accumulator: EventAccumulator,
        terminated: bool,
    }
}

impl<S> EventStream<S> {
    /// Create a new [`EventStream`] from an underlying byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            lines: LineParser::new(),
            accumulator: EventAccumulator::new(),
            terminated: false,
        }
    }
}

impl<S, E, B> Stream for EventStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    type Item = Result<Frame, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            while let Some(line) = this.lines.next_line() {
                if let Some(frame) = this.accumulator.accept(line) {
                    return Poll::Ready(Some(Ok(frame)));
                }
            }

            if *this.terminated {
                return Poll::Ready(None);
            }

            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.lines.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    *this.terminated = true;
                    this.accumulator.reset();
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    *this.terminated = true;
                    this.accumulator.reset();
                    return Poll::Ready(None);
                }
            }
        }
    }
}
