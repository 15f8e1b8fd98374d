use crate::producer::RowMessage;
use crate::schema::Row;
use crate::IngestError;
use tokio::sync::mpsc;

/// Pull-style view over the producer channel, as the COPY consumer sees it.
///
/// `advance` -> `current` until `advance` returns false, then `error` tells a
/// clean end of stream apart from a producer failure.
pub struct RowSource {
    rx: mpsc::Receiver<RowMessage>,
    row: Row,
    err: Option<IngestError>,
    done: bool,
}

impl RowSource {
    pub fn new(rx: mpsc::Receiver<RowMessage>) -> Self {
        Self {
            rx,
            row: Row::new(),
            err: None,
            done: false,
        }
    }

    /// Wait for the next row. False once the producer has closed the stream.
    pub async fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        match self.rx.recv().await {
            Some(Ok(row)) => {
                self.row = row;
                true
            }
            Some(Err(e)) => {
                self.err = Some(e);
                self.finish()
            }
            None => self.finish(),
        }
    }

    /// Row made current by the last successful [`advance`](Self::advance).
    pub fn current(&self) -> &Row {
        &self.row
    }

    pub fn error(&self) -> Option<&IngestError> {
        self.err.as_ref()
    }

    pub fn take_error(&mut self) -> Option<IngestError> {
        self.err.take()
    }

    fn finish(&mut self) -> bool {
        self.done = true;
        self.row.clear();
        // unblocks a producer parked on a full channel
        self.rx.close();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(v: &str) -> Row {
        vec![v.to_string()]
    }

    #[tokio::test]
    async fn yields_rows_in_order_then_ends_clean() {
        let (tx, rx) = mpsc::channel(4);
        let mut source = RowSource::new(rx);
        tx.send(Ok(row("a"))).await.unwrap();
        tx.send(Ok(row("b"))).await.unwrap();
        drop(tx);

        assert!(source.advance().await);
        assert_eq!(source.current(), &row("a"));
        assert!(source.advance().await);
        assert_eq!(source.current(), &row("b"));
        assert!(!source.advance().await);
        assert!(source.error().is_none());
        assert!(!source.advance().await);
    }

    #[tokio::test]
    async fn terminal_error_is_kept() {
        let (tx, rx) = mpsc::channel(4);
        let mut source = RowSource::new(rx);
        tx.send(Ok(row("a"))).await.unwrap();
        tx.send(Err(IngestError::MissingColumn("domain".into())))
            .await
            .unwrap();
        // anything after the error is never surfaced
        let _ = tx.send(Ok(row("late"))).await;

        assert!(source.advance().await);
        assert!(!source.advance().await);
        assert!(matches!(source.error(), Some(IngestError::MissingColumn(_))));
        assert!(!source.advance().await);
        assert!(source.take_error().is_some());
    }
}
