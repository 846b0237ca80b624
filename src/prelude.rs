pub use crate::data::affinities::{
    gaussian_affinities, student_t_affinities, Bandwidth, KernelNormalisation, KernelParams,
    SelfAffinity,
};
pub use crate::data::distances::pairwise_sq_distances;
pub use crate::data::init::{initialise_embedding, parse_initialisation, EmbdInit};
pub use crate::data::perplexity::{calibrate_bandwidth, CalibrationParams};
pub use crate::error::TsneError;
pub use crate::training::objective::{embedding_loss, tsne_gradient, GradientForm, ObjectiveParams};
pub use crate::training::tsne_optimiser::{
    optimise_tsne, tsne_step, Diagnostic, LossHistory, NoopObserver, ObserverSignal,
    OptimiserStatus, TsneObserver, TsneOptimiserState,
};
pub use crate::training::{MomentumSchedule, TsneOptimParams};
pub use crate::{construct_tsne_affinities, tsne, tsne_from_init, BandwidthSelection, TsneParams, TsneOutput};
