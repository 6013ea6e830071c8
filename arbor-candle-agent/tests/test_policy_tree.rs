use anyhow::Result;
use arbor_candle_agent::{
    actor::{ActorConfig, ActorUpdateRule},
    batch::TransitionBatch,
    features::{StateEncoder, StateEncoderConfig},
    policy::{BasePolicyConfig, BranchConfig, PlainPolicy, Policy, PolicyNode, PolicyStructure},
    util::column_to_vec,
    value::{Bootstrap, CriticCtx, ValueConfig, ValueEstimator, ValueKind},
};
use arbor_core::{hierarchy::BranchLayout, ActionSpace, Transition};
use candle_core::{Device, Tensor};

const OBS_DIM: usize = 2;

fn one_hot(i: usize, n: usize) -> Vec<f32> {
    let mut v = vec![0.0; n];
    v[i] = 1.0;
    v
}

fn encode(batch: TransitionBatch) -> TransitionBatch {
    let sf = batch.state().clone();
    let nsf = batch.non_final_next_states().cloned();
    batch.with_features(sf, nsf)
}

fn identity_encoder() -> Result<StateEncoder> {
    StateEncoder::build(&StateEncoderConfig::default(), OBS_DIM, &Device::Cpu)
}

#[test]
fn test_terminal_transition_bootstraps_zero() -> Result<()> {
    let trs = vec![
        Transition::new(vec![0.0, 1.0], one_hot(0, 4), 1.0, vec![1.0, 1.0], false),
        Transition::new(vec![1.0, 1.0], one_hot(3, 4), 5.0, vec![2.0, 1.0], true),
        Transition::new(vec![2.0, 1.0], one_hot(2, 4), 0.0, vec![3.0, 1.0], false),
    ];
    let batch = encode(TransitionBatch::from_transitions(&trs, &Device::Cpu)?);
    assert_eq!(batch.non_final_mask(), &[true, false, true]);
    assert_eq!(batch.non_final_next_states().unwrap().dims(), &[2, OBS_DIM]);

    let config = ValueConfig::default().target_sync(None);
    let q = ValueEstimator::build(
        ValueKind::Q,
        &config,
        OBS_DIM,
        4,
        false,
        Bootstrap::Own,
        vec![],
        &Device::Cpu,
    )?;
    assert!(!q.has_target());

    let next = column_to_vec(&q.calculate_next_state_values(&batch, &CriticCtx::default())?)?;
    assert_eq!(next.len(), 3);
    assert_eq!(next[1], 0.0);

    // The TD target of the terminal row is its reward.
    let reward = batch.reward().clone();
    let target = q.calculate_updated_value_next_state(&reward, &Tensor::from_vec(next, (3, 1), &Device::Cpu)?)?;
    assert_eq!(column_to_vec(&target)?[1], 5.0);
    Ok(())
}

#[test]
fn test_hierarchical_routing() -> Result<()> {
    let layout = BranchLayout::new(&[2, 3])?;
    assert_eq!(layout.action2high_low_level(4)?, (1, 2));
    assert_eq!(layout.action2high_low_level(3)?, (1, 1));

    let actions = [0usize, 2, 1, 4, 3, 0, 2, 4, 1, 3];
    let trs = actions
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            let s = i as f32 / 10.0;
            Transition::new(vec![s, -s], one_hot(a, 5), 1.0, vec![s + 0.1, -s], i % 4 == 3)
        })
        .collect::<Vec<_>>();
    let batch = encode(TransitionBatch::from_transitions(&trs, &Device::Cpu)?);
    let argmax_before = batch.action_argmax().to_vec();

    let encoder = identity_encoder()?;
    let structure = PolicyStructure::Hierarchical {
        branches: vec![BranchConfig::plain(2), BranchConfig::plain(3)],
    };
    let mut policy = PolicyNode::build(
        &structure,
        &BasePolicyConfig::default(),
        &ActionSpace::Discrete(5),
        &encoder,
        0,
        &Device::Cpu,
    )?;
    let out = policy.optimize_networks(&batch)?;

    assert_eq!(out.record.get_scalar("decider/batch_size")?, 10.0);
    assert_eq!(out.record.get_scalar("branch0/batch_size")?, 4.0);
    assert_eq!(out.record.get_scalar("branch1/batch_size")?, 6.0);
    assert!(out.record.get_scalar("branch1/loss_q").is_ok());
    assert_eq!(out.error.dims(), &[10, 1]);
    assert_eq!(batch.action_argmax(), argmax_before.as_slice());

    let tde = policy.calculate_tde(&batch)?;
    assert_eq!(tde.dims(), &[10, 1]);
    Ok(())
}

#[test]
fn test_hierarchical_scores_fill_the_routed_branch() -> Result<()> {
    let encoder = identity_encoder()?;
    let structure = PolicyStructure::Hierarchical {
        branches: vec![BranchConfig::plain(2), BranchConfig::plain(3)],
    };
    let mut policy = PolicyNode::build(
        &structure,
        &BasePolicyConfig::default(),
        &ActionSpace::Discrete(5),
        &encoder,
        0,
        &Device::Cpu,
    )?;
    let sf = Tensor::from_slice(&[0.1f32, 0.5, -0.3, 0.9, 1.2, -0.7], (3, OBS_DIM), &Device::Cpu)?;
    let scores = policy.choose_action(&sf)?.to_vec2::<f32>()?;

    for row in scores.iter() {
        let (first, second) = row.split_at(2);
        let s1 = first.iter().sum::<f32>();
        let s2 = second.iter().sum::<f32>();
        let routed_first = first.iter().all(|&x| x > 0.0) && second.iter().all(|&x| x == 0.0);
        let routed_second = second.iter().all(|&x| x > 0.0) && first.iter().all(|&x| x == 0.0);
        assert!(routed_first || routed_second);
        assert!(((s1 + s2) - 1.0).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn test_single_branch_has_no_decider() -> Result<()> {
    let encoder = identity_encoder()?;
    let structure = PolicyStructure::Hierarchical {
        branches: vec![BranchConfig::plain(3)],
    };
    let mut policy = PolicyNode::build(
        &structure,
        &BasePolicyConfig::default(),
        &ActionSpace::Discrete(3),
        &encoder,
        0,
        &Device::Cpu,
    )?;
    let trs = (0..4)
        .map(|i| Transition::new(vec![i as f32, 0.0], one_hot(i % 3, 3), 0.0, vec![0.0, 0.0], false))
        .collect::<Vec<_>>();
    let batch = encode(TransitionBatch::from_transitions(&trs, &Device::Cpu)?);
    let out = policy.optimize_networks(&batch)?;
    assert!(out.record.get_scalar("decider/batch_size").is_err());
    assert_eq!(out.record.get_scalar("branch0/batch_size")?, 4.0);
    Ok(())
}

#[test]
fn test_cacla_v_policy() -> Result<()> {
    let encoder = identity_encoder()?;
    let space = ActionSpace::Box {
        low: vec![-1.0],
        high: vec![1.0],
    };
    let config = BasePolicyConfig::default()
        .actor_critic(true)
        .critic(ValueConfig::default().units(vec![16]))
        .actor(ActorConfig::default().units(vec![16]).rules(vec![ActorUpdateRule::CaclaV]));
    let mut policy = PlainPolicy::build(&config, &space, &encoder, &Device::Cpu)?;
    assert!(policy.q().is_none());

    let trs = (0..8)
        .map(|i| {
            let s = i as f32 / 8.0;
            Transition::new(vec![s, 1.0 - s], vec![s - 0.5], s, vec![s, s], i == 7)
        })
        .collect::<Vec<_>>();
    let batch = encode(TransitionBatch::from_transitions(&trs, &Device::Cpu)?);
    let out = policy.optimize_networks(&batch)?;

    assert!(out.record.get_scalar("loss_v").is_ok());
    let n_rows = out.record.get_scalar("actor_train_batch_size")?;
    assert!((0.0..=8.0).contains(&n_rows));
    if n_rows > 0.0 {
        assert!(out.record.get_scalar("loss_actor").is_ok());
    }
    assert!(column_to_vec(&out.error)?.iter().all(|e| *e >= 0.0));

    let actions = policy.choose_action(batch.state_features()?)?.to_vec2::<f32>()?;
    assert!(actions.iter().all(|a| a[0] >= -1.0 && a[0] <= 1.0));
    Ok(())
}

#[test]
fn test_qv_policy_optimizes_v_before_q() -> Result<()> {
    let encoder = identity_encoder()?;
    let config = BasePolicyConfig::default().bootstrap(Bootstrap::Qv);
    let mut policy = PlainPolicy::build(&config, &ActionSpace::Discrete(3), &encoder, &Device::Cpu)?;
    let trs = (0..6)
        .map(|i| Transition::new(vec![i as f32, 1.0], one_hot(i % 3, 3), 1.0, vec![0.0, 1.0], i == 5))
        .collect::<Vec<_>>();
    let batch = encode(TransitionBatch::from_transitions(&trs, &Device::Cpu)?);

    let out = policy.optimize_networks(&batch)?;
    assert!(out.record.get_scalar("loss_q").is_ok());
    assert!(out.record.get_scalar("loss_v").is_ok());
    Ok(())
}
