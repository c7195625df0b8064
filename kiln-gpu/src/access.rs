//! Access-sequence tracking for automatic barrier synthesis.
//!
//! Every buffer and every image aspect carries a small state machine that
//! remembers the last one or two GPU accesses made to it inside the current
//! submission scope. Driving the machine with the next requested access
//! yields the minimal pipeline barrier (if any) that must be recorded before
//! the command performing that access.
//!
//! The rules it encodes:
//! - writers wait on every prior reader and on prior writers;
//! - readers wait on the prior writer but coalesce freely with other readers;
//! - a chain of reads after one write shares that single write-read edge;
//! - an image layout transition is a write even when the requested access
//!   mask is read-only.

use ash::vk;

const READ_ACCESS_MASK: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::INDIRECT_COMMAND_READ.as_raw()
        | vk::AccessFlags::INDEX_READ.as_raw()
        | vk::AccessFlags::VERTEX_ATTRIBUTE_READ.as_raw()
        | vk::AccessFlags::UNIFORM_READ.as_raw()
        | vk::AccessFlags::INPUT_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::SHADER_READ.as_raw()
        | vk::AccessFlags::COLOR_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::TRANSFER_READ.as_raw()
        | vk::AccessFlags::HOST_READ.as_raw()
        | vk::AccessFlags::MEMORY_READ.as_raw(),
);

const WRITE_ACCESS_MASK: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::SHADER_WRITE.as_raw()
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags::HOST_WRITE.as_raw()
        | vk::AccessFlags::MEMORY_WRITE.as_raw(),
);

pub(crate) fn has_read_access(access: vk::AccessFlags) -> bool {
    access.intersects(READ_ACCESS_MASK)
}

pub(crate) fn has_write_access(access: vk::AccessFlags) -> bool {
    access.intersects(WRITE_ACCESS_MASK)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum AccessSequence {
    #[default]
    None,
    Reads,
    Write,
    ReadAfterWrite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BufferAccess {
    pub stages: vk::PipelineStageFlags,
    pub access: vk::AccessFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageAccess {
    pub stages: vk::PipelineStageFlags,
    pub access: vk::AccessFlags,
    pub layout: vk::ImageLayout,
}

impl Default for ImageAccess {
    fn default() -> Self {
        Self {
            stages: vk::PipelineStageFlags::empty(),
            access: vk::AccessFlags::empty(),
            layout: vk::ImageLayout::UNDEFINED,
        }
    }
}

/// Execution/memory scope of a synthesized barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BarrierScope {
    pub src_stages: vk::PipelineStageFlags,
    pub dst_stages: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

/// Scope plus the layout transition an image barrier must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageBarrierScope {
    pub scope: BarrierScope,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BufferState {
    sequence: AccessSequence,
    access: [BufferAccess; 2],
}

impl BufferState {
    /// Records `request` against the access history and returns the barrier
    /// that must precede it, if one is needed.
    pub fn sync(&mut self, request: BufferAccess) -> Option<BarrierScope> {
        let has_write = has_write_access(request.access);
        let has_read = has_read_access(request.access);

        match self.sequence {
            // no accessor before this; nothing to wait on
            AccessSequence::None => {
                if has_write {
                    self.sequence = AccessSequence::Write;
                    self.access[0] = request;
                } else if has_read {
                    self.sequence = AccessSequence::Reads;
                    self.access[0] = request;
                }
                None
            }
            AccessSequence::Reads => {
                if has_write {
                    // wait till done reading before modifying; all stages
                    // after this write wait on the write instead
                    let previous_reads = self.access[0];
                    self.sequence = AccessSequence::Write;
                    self.access[0] = request;
                    self.access[1] = BufferAccess::default();
                    Some(BarrierScope {
                        src_stages: previous_reads.stages,
                        dst_stages: request.stages,
                        src_access: previous_reads.access,
                        dst_access: request.access,
                    })
                } else if has_read {
                    // combine reads so the next writer waits on all of them
                    self.access[0] = BufferAccess {
                        stages: self.access[0].stages | request.stages,
                        access: self.access[0].access | request.access,
                    };
                    None
                } else {
                    None
                }
            }
            AccessSequence::Write => {
                if has_write {
                    let previous_write = self.access[0];
                    self.access[0] = request;
                    self.access[1] = BufferAccess::default();
                    Some(BarrierScope {
                        src_stages: previous_write.stages,
                        dst_stages: request.stages,
                        src_access: previous_write.access,
                        dst_access: request.access,
                    })
                } else if has_read {
                    // wait till all write stages are done
                    self.sequence = AccessSequence::ReadAfterWrite;
                    self.access[1] = request;
                    Some(BarrierScope {
                        src_stages: self.access[0].stages,
                        dst_stages: request.stages,
                        src_access: self.access[0].access,
                        dst_access: request.access,
                    })
                } else {
                    None
                }
            }
            AccessSequence::ReadAfterWrite => {
                if has_write {
                    // wait for the reading stages only; they already waited
                    // on the write
                    let previous_reads = self.access[1];
                    self.sequence = AccessSequence::Write;
                    self.access[0] = request;
                    self.access[1] = BufferAccess::default();
                    Some(BarrierScope {
                        src_stages: previous_reads.stages,
                        dst_stages: request.stages,
                        src_access: previous_reads.access,
                        dst_access: request.access,
                    })
                } else if has_read {
                    // a read covered by the recorded post-write reads already
                    // observes the write through the prior barrier
                    if self.access[1].stages.intersects(request.stages)
                        && self.access[1].access.intersects(request.access)
                    {
                        return None;
                    }
                    self.access[1].stages |= request.stages;
                    self.access[1].access |= request.access;
                    Some(BarrierScope {
                        src_stages: self.access[0].stages,
                        dst_stages: request.stages,
                        src_access: self.access[0].access,
                        dst_access: request.access,
                    })
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ImageState {
    sequence: AccessSequence,
    access: [ImageAccess; 2],
}

impl ImageState {
    pub fn layout(&self) -> vk::ImageLayout {
        self.access[0].layout
    }

    /// Same structure as [`BufferState::sync`], with two image-specific
    /// rules: a layout mismatch makes the request behave as a write, and a
    /// first-access transition sources from TOP_OF_PIPE with no access.
    pub fn sync(&mut self, request: ImageAccess) -> Option<ImageBarrierScope> {
        let current_layout = self.access[0].layout;
        let needs_layout_transition = current_layout != request.layout;
        let has_write = has_write_access(request.access) || needs_layout_transition;
        let has_read = has_read_access(request.access);
        let layouts = (current_layout, request.layout);

        match self.sequence {
            AccessSequence::None => {
                if has_write {
                    self.sequence = AccessSequence::Write;
                    self.access[0] = request;
                    if needs_layout_transition {
                        return Some(ImageBarrierScope {
                            scope: BarrierScope {
                                src_stages: vk::PipelineStageFlags::TOP_OF_PIPE,
                                dst_stages: request.stages,
                                src_access: vk::AccessFlags::NONE,
                                dst_access: request.access,
                            },
                            old_layout: layouts.0,
                            new_layout: layouts.1,
                        });
                    }
                    None
                } else if has_read {
                    self.sequence = AccessSequence::Reads;
                    self.access[0] = request;
                    None
                } else {
                    None
                }
            }
            AccessSequence::Reads => {
                if has_write {
                    let previous_reads = self.access[0];
                    self.sequence = AccessSequence::Write;
                    self.access[0] = request;
                    self.access[1] = ImageAccess::default();
                    Some(ImageBarrierScope {
                        scope: BarrierScope {
                            src_stages: previous_reads.stages,
                            dst_stages: request.stages,
                            src_access: previous_reads.access,
                            dst_access: request.access,
                        },
                        old_layout: layouts.0,
                        new_layout: layouts.1,
                    })
                } else if has_read {
                    self.access[0] = ImageAccess {
                        stages: self.access[0].stages | request.stages,
                        access: self.access[0].access | request.access,
                        layout: request.layout,
                    };
                    None
                } else {
                    None
                }
            }
            AccessSequence::Write => {
                if has_write {
                    let previous_write = self.access[0];
                    self.access[0] = request;
                    self.access[1] = ImageAccess::default();
                    Some(ImageBarrierScope {
                        scope: BarrierScope {
                            src_stages: previous_write.stages,
                            dst_stages: request.stages,
                            src_access: previous_write.access,
                            dst_access: request.access,
                        },
                        old_layout: layouts.0,
                        new_layout: layouts.1,
                    })
                } else if has_read {
                    self.sequence = AccessSequence::ReadAfterWrite;
                    self.access[1] = request;
                    Some(ImageBarrierScope {
                        scope: BarrierScope {
                            src_stages: self.access[0].stages,
                            dst_stages: request.stages,
                            src_access: self.access[0].access,
                            dst_access: request.access,
                        },
                        old_layout: layouts.0,
                        new_layout: layouts.1,
                    })
                } else {
                    None
                }
            }
            AccessSequence::ReadAfterWrite => {
                if has_write {
                    let previous_reads = self.access[1];
                    self.sequence = AccessSequence::Write;
                    self.access[0] = request;
                    self.access[1] = ImageAccess::default();
                    Some(ImageBarrierScope {
                        scope: BarrierScope {
                            src_stages: previous_reads.stages,
                            dst_stages: request.stages,
                            src_access: previous_reads.access,
                            dst_access: request.access,
                        },
                        old_layout: layouts.0,
                        new_layout: layouts.1,
                    })
                } else if has_read {
                    if self.access[1].stages.intersects(request.stages)
                        && self.access[1].access.intersects(request.access)
                    {
                        return None;
                    }
                    self.access[1].stages |= request.stages;
                    self.access[1].access |= request.access;
                    Some(ImageBarrierScope {
                        scope: BarrierScope {
                            src_stages: self.access[0].stages,
                            dst_stages: request.stages,
                            src_access: self.access[0].access,
                            dst_access: request.access,
                        },
                        old_layout: layouts.0,
                        new_layout: layouts.1,
                    })
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(stages: vk::PipelineStageFlags, access: vk::AccessFlags) -> BufferAccess {
        BufferAccess { stages, access }
    }

    fn img(
        stages: vk::PipelineStageFlags,
        access: vk::AccessFlags,
        layout: vk::ImageLayout,
    ) -> ImageAccess {
        ImageAccess {
            stages,
            access,
            layout,
        }
    }

    #[test]
    fn first_buffer_access_needs_no_barrier() {
        let mut state = BufferState::default();
        assert_eq!(
            state.sync(buf(
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_WRITE
            )),
            None
        );
    }

    #[test]
    fn write_then_read_emits_single_edge() {
        let mut state = BufferState::default();
        state.sync(buf(
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ));
        let barrier = state
            .sync(buf(
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::AccessFlags::SHADER_READ,
            ))
            .expect("write->read requires a barrier");
        assert_eq!(barrier.src_stages, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(barrier.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.dst_stages, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(barrier.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn reads_coalesce_without_barriers() {
        let mut state = BufferState::default();
        state.sync(buf(
            vk::PipelineStageFlags::VERTEX_SHADER,
            vk::AccessFlags::SHADER_READ,
        ));
        assert_eq!(
            state.sync(buf(
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::AccessFlags::SHADER_READ
            )),
            None
        );
        // the following writer must wait on the union of both reads
        let barrier = state
            .sync(buf(
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_WRITE,
            ))
            .expect("read->write requires a barrier");
        assert_eq!(
            barrier.src_stages,
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER
        );
    }

    #[test]
    fn read_after_write_subset_is_suppressed() {
        let mut state = BufferState::default();
        state.sync(buf(
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ));
        assert!(state
            .sync(buf(
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::AccessFlags::SHADER_READ
            ))
            .is_some());
        // same scope again: the first barrier already covers it
        assert_eq!(
            state.sync(buf(
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::AccessFlags::SHADER_READ
            )),
            None
        );
        // a disjoint read still needs its own edge from the write
        let barrier = state
            .sync(buf(
                vk::PipelineStageFlags::VERTEX_INPUT,
                vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            ))
            .expect("disjoint read needs an edge from the writer");
        assert_eq!(barrier.src_access, vk::AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn write_after_read_chain_waits_on_readers() {
        let mut state = BufferState::default();
        state.sync(buf(
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ));
        state.sync(buf(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ,
        ));
        state.sync(buf(
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::UNIFORM_READ,
        ));
        let barrier = state
            .sync(buf(
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_WRITE,
            ))
            .expect("write after reads requires a barrier");
        // sourced from the coalesced readers, not the original write
        assert_eq!(
            barrier.src_stages,
            vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER
        );
        assert_eq!(
            barrier.src_access,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::UNIFORM_READ
        );
    }

    #[test]
    fn first_image_write_with_transition_sources_top_of_pipe() {
        let mut state = ImageState::default();
        let barrier = state
            .sync(img(
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ))
            .expect("undefined->transfer-dst needs a transition");
        assert_eq!(barrier.scope.src_stages, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(barrier.scope.src_access, vk::AccessFlags::NONE);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    }

    #[test]
    fn layout_transition_promotes_read_to_write() {
        let mut state = ImageState::default();
        state.sync(img(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ));
        // pure read, but the layout changes: must behave as a write
        let barrier = state
            .sync(img(
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_READ,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ))
            .expect("transition requires a barrier");
        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(
            barrier.scope.src_access,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
        // a second read in the same layout does not transition again
        let mut probe = state;
        assert_eq!(
            probe.sync(img(
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_READ,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            )),
            None
        );
    }

    #[test]
    fn same_layout_reads_do_not_transition() {
        let mut state = ImageState::default();
        state.sync(img(
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ));
        assert!(state
            .sync(img(
                vk::PipelineStageFlags::VERTEX_SHADER,
                vk::AccessFlags::SHADER_READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ))
            .is_some());
        // fragment-stage sampling in the same layout piggybacks on nothing new
        // only if scope intersects; a disjoint stage gets its own edge
        let second = state.sync(img(
            vk::PipelineStageFlags::VERTEX_SHADER,
            vk::AccessFlags::SHADER_READ,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ));
        assert_eq!(second, None);
    }

    #[test]
    fn sampled_then_storage_write_unions_readers() {
        let mut state = ImageState::default();
        // image already resident in SHADER_READ_ONLY_OPTIMAL
        state.sync(img(
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::NONE,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ));
        state.sync(img(
            vk::PipelineStageFlags::VERTEX_SHADER,
            vk::AccessFlags::SHADER_READ,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ));
        state.sync(img(
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::SHADER_READ,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ));
        let barrier = state
            .sync(img(
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                vk::ImageLayout::GENERAL,
            ))
            .expect("storage write needs a barrier");
        assert!(barrier
            .scope
            .src_stages
            .contains(vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER));
        assert_eq!(barrier.old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::GENERAL);
    }
}
