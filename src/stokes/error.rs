use thiserror::Error;

#[derive(Error, Debug)]
pub enum StokesError {
    #[error("Forming Stokes parameters needs the XX, XY, YX and YY polarisations, but only {0:?} are available")]
    MissingPolarisations(Vec<String>),

    #[error("Don't know the polarisation convention for telescope '{0}'; use the raw convention instead")]
    UnknownTelescope(String),

    #[error("Primary-beam correction factors must be positive and finite; got {0}")]
    BadBeamFactor(f64),

    #[error("Integration {index} is out of range; there are {num_integrations} integrations")]
    BadIntegration {
        index: usize,
        num_integrations: usize,
    },
}
