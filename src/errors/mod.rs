use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StencilDocxError {
    #[error("input document not found: {0}")]
    InputNotFound(PathBuf),

    #[error("failed to open document package")]
    PackageOpen {
        #[from]
        source: zip::result::ZipError,
    },

    #[error("required package part missing: {0}")]
    RequiredPartMissing(String),

    #[error("failed to parse document XML")]
    XmlParse {
        #[from]
        source: xml::reader::Error,
    },

    #[error("failed to write XML data")]
    FailedWriteXml,

    #[error("could not synthesize package fragment: {0}")]
    FragmentSynthesis(String),

    #[error("image file missing: {0}")]
    MediaFileMissing(PathBuf),

    #[error("unterminated placeholder marker: %*{0}")]
    UnterminatedMarker(String),

    #[error("ambiguous row binding for prefix `{0}`")]
    AmbiguousRowBinding(String),

    #[error(transparent)]
    Io {
        #[from]
        source: std::io::Error,
    },
}
