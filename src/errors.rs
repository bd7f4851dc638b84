use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Connection with {service} failed: {source}"))]
    NetworkError {
        service: String,
        source: reqwest::Error,
    },

    #[snafu(display("Error parsing data from {service}: {source}"))]
    ParseError {
        service: String,
        source: serde_json::Error,
    },

    #[snafu(display(
        "Attempted to import race with more slots ({required}) than available nodes ({available})"
    ))]
    SeatCapacityError { required: usize, available: usize },

    #[snafu(display("Unrecognized RaceSync format: {code}"))]
    UnrecognizedFormatError { code: String },

    #[snafu(display("Pilot {pilot_id} does not have a RaceSync pilot id"))]
    MissingPilotIdError { pilot_id: i32 },

    #[snafu(display("Invalid RaceSync race id: {race_id}"))]
    InvalidRaceIdError { race_id: String },

    #[snafu(display("{action} already in progress"))]
    BusyError { action: String },

    #[snafu(display("Additional ZippyQ rounds not found for race {race_id}"))]
    NoMoreRoundsError { race_id: String },

    #[snafu(display("System verification failed: {reason}"))]
    IntegrityError { reason: String },

    #[snafu(display("{entity} not found: {id}"))]
    NotFoundError { entity: String, id: String },

    #[snafu(display("{details}"))]
    AlreadyExistsError { details: String },

    #[snafu(display("Invalid configuration value for {key}: {message}"))]
    ConfigError { key: String, message: String },
}

pub type CustomResult<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// # is transient
    /// whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NetworkError { .. } | Error::BusyError { .. })
    }
}
