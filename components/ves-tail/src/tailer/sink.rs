// External crates
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Append-only, line-oriented output. Each line is flushed as soon as it is
/// written so ordering on the terminal matches the order of `write_line` calls.
#[derive(Debug)]
pub struct LineSink<W> {
    writer: W,
    lines_written: u64,
}

impl<W> LineSink<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            lines_written: 0,
        }
    }

    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        self.lines_written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl LineSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}
