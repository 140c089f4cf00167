//! End-to-end forward-pass and training-step checks on synthetic batches.

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::SeedableRng;

use signal_dan::models::Dan;
use signal_dan::{
    DanConfig, DanTrainer, EncoderKind, Mode, SignalBatch, TrainerConfig,
};

fn small_config(encoder: EncoderKind) -> DanConfig {
    DanConfig {
        encoder,
        c_dim: 8,
        input_height: 16,
        input_width: 16,
        resampling: 16,
        num_domains: 5,
        ..Default::default()
    }
}

fn build(config: DanConfig) -> Dan {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    Dan::new(config, vb).expect("model construction")
}

#[test]
fn train_forward_pass_produces_the_full_adversarial_tuple() {
    let dan = build(small_config(EncoderKind::Vae));
    // Four samples, each four windows long.
    let batch = SignalBatch::synthetic(16, 64, &[64, 64, 64, 64], 5, &Device::Cpu).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let out = dan.forward_train(&batch, 0.5, &mut rng).unwrap();
    assert_eq!(out.label_logits.dims(), &[4, 2]);
    assert_eq!(out.domain_logits.0.dims(), &[4, 5]);
    assert_eq!(out.domain_logits.1.dims(), &[4, 5]);
    assert_eq!(out.pairing_labels.dims(), &[4]);

    let recon: f32 = out
        .recon_loss
        .expect("VAE encoder reports a reconstruction loss")
        .to_scalar()
        .unwrap();
    assert!(recon.is_finite() && recon >= 0.0, "recon loss {recon}");

    // Pairing labels are a same-domain indicator over the reported order.
    let labels: Vec<f32> = out.pairing_labels.to_vec1().unwrap();
    for (i, &p) in out.pairing_order.iter().enumerate() {
        let expected = if batch.domains[i] == batch.domains[p] {
            1.0
        } else {
            0.0
        };
        assert_eq!(labels[i], expected, "pair ({i}, {p})");
    }
}

#[test]
fn cnn_encoder_runs_the_same_pipeline_without_recon_loss() {
    let dan = build(small_config(EncoderKind::Cnn));
    let batch = SignalBatch::synthetic(16, 48, &[48, 32, 16, 16], 5, &Device::Cpu).unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    let out = dan.forward_train(&batch, 1.0, &mut rng).unwrap();
    assert_eq!(out.label_logits.dims(), &[4, 2]);
    assert!(out.recon_loss.is_none());
}

#[test]
fn variable_length_batch_pads_to_the_longest_sample() {
    let dan = build(small_config(EncoderKind::Vae));
    // Longest sample is not first; depth must still follow it.
    let batch = SignalBatch::synthetic(16, 80, &[16, 80, 48], 5, &Device::Cpu).unwrap();
    let segmented = dan.segment(&batch.signals, &batch.lengths, true).unwrap();
    assert_eq!(segmented.latents.dims(), &[3, 5, 8]);
}

#[test]
fn inference_mode_forward_returns_label_logits_only() {
    let config = DanConfig {
        mode: Mode::Inference,
        ..small_config(EncoderKind::Vae)
    };
    let dan = build(config);
    let batch = SignalBatch::synthetic(16, 32, &[32, 32], 5, &Device::Cpu).unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    match dan.forward(&batch, 1.0, &mut rng).unwrap() {
        signal_dan::DanOutput::Inference { label_logits } => {
            assert_eq!(label_logits.dims(), &[2, 2]);
        }
        signal_dan::DanOutput::Train(_) => panic!("inference mode returned the train tuple"),
    }
}

#[test]
fn trainer_runs_an_epoch_and_records_history() {
    let trainer_config = TrainerConfig {
        epochs: 1,
        eval_every: 1,
        ..Default::default()
    };
    let mut trainer = DanTrainer::new(small_config(EncoderKind::Vae), trainer_config).unwrap();
    let batch = SignalBatch::synthetic(16, 64, &[64, 48, 32, 16], 5, &Device::Cpu).unwrap();

    let result = trainer
        .train_epoch(std::slice::from_ref(&batch), Some(&batch), 1)
        .unwrap();
    assert_eq!(result.num_batches, 1);
    assert!(result.avg.total_loss.is_finite());
    let accuracy = result.accuracy.expect("eval_every=1 evaluates every epoch");
    assert!((0.0..=1.0).contains(&accuracy));

    assert!(trainer.record_epoch(result));
    assert_eq!(trainer.history().epochs.len(), 1);
    assert_eq!(trainer.history().total_steps, 1);
}
