use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("object not found: {}", name))]
    ObjectNotFound { name: String },

    #[snafu(display("failed to parse block meta '{}': {}", name, source))]
    ParseBlockMeta {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("series request exceeds chunk pool budget of {} bytes", limit))]
    ChunkPoolExhausted { limit: usize },

    #[snafu(display("grpc transport error: {}", source))]
    Transport { source: tonic::transport::Error },

    #[snafu(display("{}", reason))]
    CommonError { reason: String },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ObjectNotFound { .. })
    }
}
