//! Timestamp and pipeline-statistics query pools.

use std::sync::Arc;

use ash::vk;

use crate::device::DeviceShared;

pub(crate) const STATISTICS_FLAGS: vk::QueryPipelineStatisticFlags =
    vk::QueryPipelineStatisticFlags::from_raw(
        vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_VERTICES.as_raw()
            | vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_PRIMITIVES.as_raw()
            | vk::QueryPipelineStatisticFlags::VERTEX_SHADER_INVOCATIONS.as_raw()
            | vk::QueryPipelineStatisticFlags::CLIPPING_INVOCATIONS.as_raw()
            | vk::QueryPipelineStatisticFlags::CLIPPING_PRIMITIVES.as_raw()
            | vk::QueryPipelineStatisticFlags::FRAGMENT_SHADER_INVOCATIONS.as_raw()
            | vk::QueryPipelineStatisticFlags::COMPUTE_SHADER_INVOCATIONS.as_raw(),
    );

/// Counters read back from a statistics query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStatistics {
    pub input_assembly_vertices: u64,
    pub input_assembly_primitives: u64,
    pub vertex_shader_invocations: u64,
    pub clipping_invocations: u64,
    pub clipping_primitives: u64,
    pub fragment_shader_invocations: u64,
    pub compute_shader_invocations: u64,
}

pub(crate) struct QueryResource {
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_pool: vk::QueryPool,
}

impl Drop for QueryResource {
    fn drop(&mut self) {
        unsafe {
            self.dev.device.destroy_query_pool(self.vk_pool, None);
        }
    }
}

/// Single-slot timestamp query.
#[derive(Clone)]
pub struct TimestampQuery {
    pub(crate) res: Arc<QueryResource>,
}

impl TimestampQuery {
    pub(crate) fn vk(&self) -> vk::QueryPool {
        self.res.vk_pool
    }
}

impl std::fmt::Debug for TimestampQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampQuery").finish_non_exhaustive()
    }
}

/// Single-slot pipeline-statistics query.
#[derive(Clone)]
pub struct StatisticsQuery {
    pub(crate) res: Arc<QueryResource>,
}

impl StatisticsQuery {
    pub(crate) fn vk(&self) -> vk::QueryPool {
        self.res.vk_pool
    }
}

impl std::fmt::Debug for StatisticsQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsQuery").finish_non_exhaustive()
    }
}
