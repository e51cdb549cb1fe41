use crate::concierge::Concierge;
use crate::maps::MapsApi;
use crate::model::ModelProvider;
use std::sync::Arc;

pub(crate) struct ServerState<P: ModelProvider, M: MapsApi> {
    concierge: Arc<Concierge<P, M>>,
    maps: Arc<M>,
}

impl<P: ModelProvider, M: MapsApi> ServerState<P, M> {
    pub(crate) fn new(concierge: Arc<Concierge<P, M>>, maps: Arc<M>) -> Self {
        Self { concierge, maps }
    }

    pub(crate) fn concierge(&self) -> Arc<Concierge<P, M>> {
        Arc::clone(&self.concierge)
    }

    pub(crate) fn maps(&self) -> Arc<M> {
        Arc::clone(&self.maps)
    }
}
