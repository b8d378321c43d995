use acg_graph::{parse_newick, CfEventKind, CfEventList, ConversionGraph, ConversionModel, Locus, NodeId};

#[test]
fn events_count_lineages_above_each_event() {
    let frame = parse_newick("((A:1,B:1.5):1,C:1.5);").unwrap();
    let events = CfEventList::from_frame(&frame);
    let summary: Vec<(f64, CfEventKind, usize)> = events
        .events()
        .iter()
        .map(|e| (e.height, e.kind, e.lineages))
        .collect();
    assert_eq!(
        summary,
        vec![
            (0.0, CfEventKind::Sample, 1),
            (0.5, CfEventKind::Sample, 2),
            (1.0, CfEventKind::Sample, 3),
            (1.5, CfEventKind::Coalescence, 2),
            (2.5, CfEventKind::Coalescence, 1),
        ]
    );
    assert_eq!(events.events().last().unwrap().node, frame.root());
}

#[test]
fn interval_lookup_is_strictly_below() {
    let frame = parse_newick("((A:1,B:1):1,C:2);").unwrap();
    let events = CfEventList::from_frame(&frame);
    // Three samples at 0, then coalescences at 1 and 2.
    assert_eq!(events.interval_containing(0.0), 0);
    assert_eq!(events.interval_containing(0.5), 2);
    assert_eq!(events.interval_containing(1.0), 2);
    assert_eq!(events.interval_containing(1.5), 3);
    assert_eq!(events.interval_containing(10.0), 4);
    assert_eq!(events.interval_end(2), Some(1.0));
    assert_eq!(events.interval_end(4), None);
}

#[test]
fn memo_is_invalidated_by_frame_edits() {
    let frame = parse_newick("((A:1,B:1):1,C:2);").unwrap();
    let mut acg =
        ConversionGraph::new(frame, vec![Locus::new("l", 10).unwrap()], ConversionModel::Unrestricted)
            .unwrap();
    assert_eq!(acg.cf_events().events()[3].height, 1.0);
    acg.frame_mut().set_height(NodeId::from_raw(3), 1.5);
    assert_eq!(acg.cf_events().events()[3].height, 1.5);
}

#[test]
fn skyline_boundaries_follow_group_sizes() {
    let frame = parse_newick("(((A:1,B:1):1,C:2):1,D:3);").unwrap();
    let events = CfEventList::from_frame(&frame);
    assert_eq!(events.skyline_boundaries(&[1, 2]).unwrap(), vec![0.0, 1.0]);
    assert_eq!(events.skyline_boundaries(&[2, 1]).unwrap(), vec![0.0, 2.0]);
    assert_eq!(events.skyline_boundaries(&[3]).unwrap(), vec![0.0]);
    assert!(events.skyline_boundaries(&[1, 1]).is_err());
    assert!(events.skyline_boundaries(&[0, 3]).is_err());
}
