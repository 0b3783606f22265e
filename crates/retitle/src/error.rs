#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(std::path::PathBuf),

    #[error(transparent)]
    Pdf(#[from] pdf::PdfError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}
