pub mod flush;
pub mod heartbeat;
pub mod metric;
pub mod sink;
pub mod statser;
pub mod tags;

pub use flush::{run_flusher, FlushNotifier, FlushSubscription, Flushable};
pub use heartbeat::{HeartBeater, HEARTBEAT_VALUE};
pub use metric::{MetricPoint, MetricType};
pub use sink::{LogSink, MemorySink, MetricSink};
pub use statser::{
    BufferedStatser, NullStatser, Reporter, StatsError, StatsResult, Statser, StatserExt,
};
pub use tags::Tags;

pub mod prelude {
    pub use crate::flush::*;
    pub use crate::heartbeat::*;
    pub use crate::metric::*;
    pub use crate::sink::*;
    pub use crate::statser::*;
    pub use crate::tags::*;
}
