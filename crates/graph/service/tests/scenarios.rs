//! End-to-end scenarios against an in-process service.

use std::time::Duration;

use approx::assert_relative_eq;
use framegraph_service::{FrameGraphConfig, FrameGraphService, ServiceError};
use framegraph_store::StoreError;
use framegraph_triggers::{Notification, TriggerMessage};
use framegraph_types::{
    BoundingBox, DataBlob, DataType, Epsilon, FrameId, LabelFilter, LinkContent, LinkId, Sphere, TimeFilter,
    TimeStamp, Transform, TriggerId,
};
use tokio::sync::mpsc;

fn service() -> FrameGraphService {
    FrameGraphService::new(&FrameGraphConfig::default()).unwrap()
}

/// Commit a world frame with a child one metre along x.
async fn world_and_child(svc: &FrameGraphService) -> (FrameId, FrameId, LinkId) {
    let tx = svc.start_transaction().await;
    let world = svc.create_frame(tx, Some("world")).await.unwrap();
    let child = svc.create_frame(tx, Some("child")).await.unwrap();
    let link = svc
        .set_link(
            tx,
            LinkContent::new(world, child, Transform::from_translation(1.0, 0.0, 0.0)),
            None,
        )
        .await
        .unwrap();
    assert_eq!(svc.commit_transaction(tx).await, (true, String::new()));
    (world, child, link)
}

async fn recv(rx: &mut mpsc::Receiver<TriggerMessage>) -> TriggerMessage {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("notification expected")
        .expect("channel open")
}

#[tokio::test]
async fn committed_link_estimates_child_at_link_transform() {
    let svc = service();
    let (world, child, link) = world_and_child(&svc).await;

    let tx = svc.start_transaction().await;
    let poses = svc.estimate_frames(tx, &[link], world, "").await.unwrap();
    assert_eq!(poses.origin, world);
    assert_eq!(poses.get(world), Some(&Transform::identity()));
    let t = poses.get(child).unwrap().translation();
    assert_relative_eq!(t.x, 1.0, epsilon = 1e-12);
    assert_relative_eq!(t.y, 0.0, epsilon = 1e-12);

    // Relative to the child, the world sits one metre back
    let back = svc.estimate_frames(tx, &[link], child, "spanning_tree").await.unwrap();
    assert_relative_eq!(back.get(world).unwrap().translation().x, -1.0, epsilon = 1e-12);
}

#[tokio::test]
async fn concurrent_writers_on_one_link_commit_at_most_once() {
    let svc = service();
    let (world, child, link) = world_and_child(&svc).await;

    let first = svc.start_transaction().await;
    let second = svc.start_transaction().await;
    for (tx, x) in [(first, 2.0), (second, 3.0)] {
        svc.set_link(
            tx,
            LinkContent::new(world, child, Transform::from_translation(x, 0.0, 0.0)),
            Some(link),
        )
        .await
        .unwrap();
    }

    let (ok_first, _) = svc.commit_transaction(first).await;
    let (ok_second, reason) = svc.commit_transaction(second).await;
    assert!(ok_first);
    assert!(!ok_second);
    assert!(!reason.is_empty());

    // The loser is gone
    assert!(matches!(
        svc.list_frames(second).await,
        Err(ServiceError::Store(StoreError::TransactionNotActive(_)))
    ));
}

#[tokio::test]
async fn reusing_a_link_id_keeps_its_data() {
    let svc = service();
    let (world, child, link) = world_and_child(&svc).await;

    let tx = svc.start_transaction().await;
    svc.set_link_data(tx, link, "calibration".into(), "v1".into()).await.unwrap();
    let content = LinkContent::new(world, child, Transform::from_translation(5.0, 0.0, 0.0))
        .with_confidence(0.25);
    assert_eq!(svc.set_link(tx, content.clone(), Some(link)).await.unwrap(), link);
    assert!(svc.commit_transaction(tx).await.0);

    let tx = svc.start_transaction().await;
    let resolved = svc.resolve_links(tx, &[link]).await.unwrap();
    assert_eq!(resolved[0].content, content);
    let data = svc.get_link_data(tx, link, &[]).await.unwrap();
    assert_eq!(data.get(&DataType::from("calibration")), Some(&DataBlob::from("v1")));
}

#[tokio::test]
async fn deleting_a_frame_removes_its_links_and_data() {
    let svc = service();
    let (world, child, link) = world_and_child(&svc).await;

    let tx = svc.start_transaction().await;
    svc.set_frame_data(tx, child, "mesh".into(), "m".into()).await.unwrap();
    svc.set_link_data(tx, link, "note".into(), "n".into()).await.unwrap();
    assert!(svc.commit_transaction(tx).await.0);

    let tx = svc.start_transaction().await;
    svc.delete_frame(tx, child).await.unwrap();
    assert!(svc.commit_transaction(tx).await.0);

    let tx = svc.start_transaction().await;
    assert!(matches!(
        svc.get_frame_data(tx, child, &[]).await,
        Err(ServiceError::Store(StoreError::FrameNotFound(_)))
    ));
    assert!(svc.get_links(tx, &[world], true, None, None).await.unwrap().is_empty());
    assert!(matches!(
        svc.get_link_data(tx, link, &[]).await,
        Err(ServiceError::Store(StoreError::LinkNotFound(_)))
    ));
    assert_eq!(svc.get_frame_id(tx, "child").await.unwrap(), None);
}

#[tokio::test]
async fn frame_names_are_unique() {
    let svc = service();
    let tx = svc.start_transaction().await;
    let f = svc.create_frame(tx, None).await.unwrap();
    let g = svc.create_frame(tx, None).await.unwrap();
    assert!(svc.set_frame_name(tx, f, "world").await.unwrap());
    assert!(!svc.set_frame_name(tx, g, "world").await.unwrap());
    assert_eq!(svc.get_frame_id(tx, "world").await.unwrap(), Some(f));
    assert_eq!(svc.get_frame_name(tx, g).await.unwrap(), None);
}

#[tokio::test]
async fn watched_frame_reports_new_link() {
    let svc = service();
    let (world, _, _) = world_and_child(&svc).await;

    let trigger = svc.watch_links(&[world], None).await;
    assert_ne!(trigger, TriggerId::INVALID);
    let (_sub, mut rx) = svc.subscribe(Some(vec![trigger])).await;

    let tx = svc.start_transaction().await;
    let other = svc.create_frame(tx, None).await.unwrap();
    let added = svc
        .set_link(tx, LinkContent::new(world, other, Transform::identity()), None)
        .await
        .unwrap();
    assert!(svc.commit_transaction(tx).await.0);

    let message = recv(&mut rx).await;
    assert_eq!(message.trigger, trigger);
    assert_eq!(
        message.notification,
        Notification::LinksChanged {
            added: vec![added],
            removed: vec![],
        }
    );
}

#[tokio::test]
async fn aborted_and_conflicted_commits_notify_nobody() {
    let svc = service();
    let (world, child, link) = world_and_child(&svc).await;
    svc.watch_links(&[world], None).await;
    let (_sub, mut rx) = svc.subscribe(None).await;

    let tx = svc.start_transaction().await;
    svc.delete_links(tx, &[link]).await.unwrap();
    svc.abort_transaction(tx, "changed my mind").await;

    let a = svc.start_transaction().await;
    let b = svc.start_transaction().await;
    svc.delete_links(a, &[link]).await.unwrap();
    svc.set_link(b, LinkContent::new(world, child, Transform::identity()), Some(link))
        .await
        .unwrap();
    assert!(svc.commit_transaction(a).await.0);
    assert!(!svc.commit_transaction(b).await.0);

    svc.flush_triggers().await;
    let message = rx.try_recv().unwrap();
    assert_eq!(
        message.notification,
        Notification::LinksChanged {
            added: vec![],
            removed: vec![link],
        }
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn estimated_transform_watch_honours_epsilon() {
    let svc = service();
    let (world, child, link) = world_and_child(&svc).await;
    let trigger = svc
        .watch_estimated_transforms(&[child], world, Epsilon::new(0.5, 0.1), "", None)
        .await;
    let (_sub, mut rx) = svc.subscribe(Some(vec![trigger])).await;

    for x in [1.2, 2.0] {
        let tx = svc.start_transaction().await;
        svc.set_link(
            tx,
            LinkContent::new(world, child, Transform::from_translation(x, 0.0, 0.0)),
            Some(link),
        )
        .await
        .unwrap();
        assert!(svc.commit_transaction(tx).await.0);
    }
    svc.flush_triggers().await;

    // Only the second move exceeded epsilon
    let message = rx.try_recv().unwrap();
    assert_eq!(
        message.notification,
        Notification::EstimatedFramesMoved {
            frames: vec![child],
            origin: world,
        }
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn back_to_back_moves_each_notify_before_flush() {
    let svc = service();
    let (world, child, link) = world_and_child(&svc).await;
    let trigger = svc
        .watch_estimated_transforms(&[child], world, Epsilon::new(0.5, 0.5), "", None)
        .await;
    let (_sub, mut rx) = svc.subscribe(Some(vec![trigger])).await;

    // Out to x = 3 and back to x = 1 with no flush in between
    let mut versions = Vec::new();
    for x in [3.0, 1.0] {
        let tx = svc.start_transaction().await;
        svc.set_link(
            tx,
            LinkContent::new(world, child, Transform::from_translation(x, 0.0, 0.0)),
            Some(link),
        )
        .await
        .unwrap();
        assert!(svc.commit_transaction(tx).await.0);
        versions.push(svc.store().head().number());
    }
    svc.flush_triggers().await;

    for version in versions {
        let message = rx.try_recv().unwrap();
        assert_eq!(message.version, version);
        assert_eq!(
            message.notification,
            Notification::EstimatedFramesMoved {
                frames: vec![child],
                origin: world,
            }
        );
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn data_watches_report_per_type() {
    let svc = service();
    let (world, child, link) = world_and_child(&svc).await;
    let frames = svc.watch_frame_data(&[world, child], None).await;
    let links = svc.watch_link_data(&[link], None).await;
    let (_sub, mut rx) = svc.subscribe(None).await;

    let tx = svc.start_transaction().await;
    svc.set_frame_data(tx, child, "image".into(), "px".into()).await.unwrap();
    svc.set_link_data(tx, link, "residual".into(), "0.1".into()).await.unwrap();
    assert!(svc.commit_transaction(tx).await.0);
    svc.flush_triggers().await;

    let mut seen = vec![rx.try_recv().unwrap(), rx.try_recv().unwrap()];
    seen.sort_by_key(|m| m.trigger);
    assert_eq!(seen[0].trigger, frames);
    assert_eq!(
        seen[0].notification,
        Notification::FrameDataChanged {
            frames: vec![child],
            data_type: "image".into(),
        }
    );
    assert_eq!(seen[1].trigger, links);
    assert_eq!(
        seen[1].notification,
        Notification::LinkDataChanged {
            links: vec![link],
            data_type: "residual".into(),
        }
    );
}

#[tokio::test]
async fn deleting_triggers_twice_is_a_no_op() {
    let svc = service();
    let (world, _, _) = world_and_child(&svc).await;
    let trigger = svc.watch_links(&[world], None).await;

    svc.delete_triggers(&[trigger]).await;
    svc.delete_triggers(&[trigger]).await;
    assert_eq!(svc.stats().await.triggers, 0);

    // A deleted trigger cannot be reused
    assert_eq!(svc.watch_links(&[world], Some(trigger)).await, TriggerId::INVALID);
}

#[tokio::test]
async fn invalid_registrations_return_invalid_id() {
    let svc = service();
    assert_eq!(svc.watch_links(&[FrameId(404)], None).await, TriggerId::INVALID);
    assert_eq!(svc.watch_link_data(&[], None).await, TriggerId::INVALID);
}

#[tokio::test]
async fn spatial_estimates_respect_region_and_filters() {
    let svc = service();
    let tx = svc.start_transaction().await;
    let origin = svc.create_frame(tx, Some("origin")).await.unwrap();
    let mut frames = vec![origin];
    for i in 1..=4 {
        let next = svc.create_frame(tx, None).await.unwrap();
        let content = LinkContent::new(frames[i - 1], next, Transform::from_translation(1.0, 0.0, 0.0))
            .with_label(if i % 2 == 0 { "odometry" } else { "loop" })
            .with_time(TimeStamp::from_secs(i as i64));
        svc.set_link(tx, content, None).await.unwrap();
        frames.push(next);
    }

    // Chain along x at 1, 2, 3, 4 metres
    let bbox = BoundingBox::from_corners([-0.5, -0.5, -0.5], [2.5, 0.5, 0.5]);
    let boxed = svc
        .estimate_frames_within_box(tx, origin, &bbox, None, None, "")
        .await
        .unwrap();
    assert_eq!(boxed.frame_ids().collect::<Vec<_>>(), frames[..3].to_vec());

    let sphere = Sphere::new([0.0, 0.0, 0.0], 3.5);
    let round = svc
        .estimate_frames_within_sphere(tx, origin, &sphere, None, None, "")
        .await
        .unwrap();
    assert_eq!(round.len(), 4);

    let near = svc
        .estimate_neighboring_frames(tx, origin, 2, None, None, "")
        .await
        .unwrap();
    assert_eq!(near.len(), 3);

    // Excluding the first hop's label cuts the origin off
    let loops = LabelFilter::exclude(["loop"]);
    let cut = svc
        .estimate_neighboring_frames(tx, origin, 4, None, Some(&loops), "")
        .await
        .unwrap();
    assert_eq!(cut.len(), 1);

    let neighbours = svc
        .get_neighbour_frames(tx, &[origin], 1, Some(&TimeFilter::latest()), None)
        .await
        .unwrap();
    assert!(neighbours.contains(&frames[1]));
}

#[tokio::test]
async fn reads_are_isolated_from_later_commits() {
    let svc = service();
    let (world, child, link) = world_and_child(&svc).await;

    let reader = svc.start_transaction().await;
    let writer = svc.start_transaction().await;
    svc.delete_frame(writer, child).await.unwrap();
    assert!(svc.commit_transaction(writer).await.0);

    assert_eq!(svc.resolve_links(reader, &[link]).await.unwrap().len(), 1);
    assert_eq!(svc.get_frame_id(reader, "child").await.unwrap(), Some(child));
    let poses = svc.estimate_frames(reader, &[link], world, "").await.unwrap();
    assert!(poses.contains(child));
    assert!(svc.commit_transaction(reader).await.0);
}
