//! Dispatch planning for stages with several instances
//!
//! A plan lists which instance receives which snapshot. Plans are ordered
//! by instance index so merging their replies in plan order is
//! deterministic.

use crate::pool::StageInstances;
use crate::protocol::DocumentSnapshot;
use docpipe_document::{Attachment, Document};
use docpipe_driver::{DispatchPolicy, InstanceHandle};

/// One call of a stage
#[derive(Debug, Clone)]
pub struct Dispatch<'a> {
    /// Target instance
    pub handle: &'a InstanceHandle,
    /// Snapshot to send
    pub snapshot: DocumentSnapshot,
}

/// Build the calls for one stage execution
#[must_use]
pub fn plan<'a>(
    policy: DispatchPolicy,
    instances: &'a StageInstances,
    document: &Document,
) -> Vec<Dispatch<'a>> {
    match policy {
        DispatchPolicy::PartitionAttachments
            if instances.len() > 1 && !document.attachments().is_empty() =>
        {
            partition_attachments(instances, document)
        }
        _ => vec![Dispatch {
            handle: instances.next_round_robin(),
            snapshot: DocumentSnapshot::capture(document),
        }],
    }
}

fn partition_attachments<'a>(
    instances: &'a StageInstances,
    document: &Document,
) -> Vec<Dispatch<'a>> {
    let mut buckets: Vec<Vec<Attachment>> = vec![Vec::new(); instances.len()];
    for (i, attachment) in document.attachments().iter().enumerate() {
        buckets[i % instances.len()].push(attachment.clone());
    }

    instances
        .handles()
        .iter()
        .zip(buckets)
        .filter(|(_, share)| !share.is_empty())
        .map(|(handle, share)| Dispatch {
            handle,
            snapshot: DocumentSnapshot::with_attachments(document, share),
        })
        .collect()
}
