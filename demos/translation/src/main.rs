//! Translation through the full pipeline stack, against the in-crate mock
//! execution engine: publish a graph bundle to a memory store, resolve it
//! through the artifact provider, and stream the decoded tokens.

use futures::StreamExt;
use konro::backend::TensorSpec;
use konro::backend::mock::MockEngine;
use konro::config::{
    Architecture, DecoderConfig, GraphRole, ModelConfig, Precision, Task, TensorNaming,
};
use konro::pipeline::{Pipeline, Tokenizer};
use konro::provider::{GraphHandle, MemoryStore, save_bundle};
use konro::tensor::constant::KV_SEQ_DIM;
use konro::{DType, Tensor, TensorMap};
use std::collections::HashMap;
use std::sync::Arc;

const SOURCE: &str = "He never went out without a book under his arm, and he often came back with two.";
const TARGET: &str = "Il ne sortait jamais sans un livre sous le bras, et il revenait souvent avec deux.";
const EOS: i64 = 1;
const LAYERS: usize = 2;

/// Whitespace vocabulary tokenizer: 0 is the decoder start token, 1 the
/// end token.
struct VocabTokenizer {
    vocab: Vec<String>,
    index: HashMap<String, i64>,
}

impl VocabTokenizer {
    fn new(sentences: &[&str]) -> Self {
        let mut vocab: Vec<String> = vec!["<start>".into(), "<eos>".into()];
        for sentence in sentences {
            for word in sentence.split_whitespace() {
                if !vocab.iter().any(|w| w == word) {
                    vocab.push(word.into());
                }
            }
        }
        let index = vocab
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i as i64))
            .collect();
        Self { vocab, index }
    }
}

impl Tokenizer for VocabTokenizer {
    fn encode(&self, text: &str) -> konro::Result<Vec<i64>> {
        text.split_whitespace()
            .map(|word| {
                self.index
                    .get(word)
                    .copied()
                    .ok_or_else(|| konro::Error::InvalidInput(format!("word '{word}' not in vocabulary")))
            })
            .collect()
    }

    fn decode(&self, ids: &[i64]) -> konro::Result<String> {
        let words: konro::Result<Vec<&str>> = ids
            .iter()
            .map(|&id| {
                self.vocab
                    .get(id as usize)
                    .map(String::as_str)
                    .ok_or_else(|| konro::Error::InvalidInput(format!("id {id} not in vocabulary")))
            })
            .collect();
        Ok(words?.join(" "))
    }
}

/// Mocks a decomposed translation model: the decoder emits one target
/// token per step, then the end token.
fn build_engine(target_ids: Vec<i64>, vocab_size: usize) -> Arc<MockEngine> {
    let engine = MockEngine::new();

    engine.register(
        GraphRole::Encoder,
        vec![
            TensorSpec::new("input_ids", DType::I64, 2),
            TensorSpec::new("attention_mask", DType::I64, 2),
        ],
        vec![TensorSpec::new("encoder_hidden_states", DType::F32, 3)],
        |inputs| {
            let ids = inputs["input_ids"].i64_data()?.to_vec();
            let mut out = TensorMap::new();
            out.insert(
                "encoder_hidden_states".into(),
                Tensor::from_f32(vec![1, ids.len(), 1], ids.iter().map(|&i| i as f32).collect())?,
            );
            Ok(out)
        },
    );

    let step_outputs = move |target_ids: &[i64], seq: usize, step: usize| -> konro::Result<TensorMap> {
        let token = target_ids.get(step).copied().unwrap_or(EOS);
        let mut row = vec![0.0f32; vocab_size];
        row[token as usize] = 10.0;
        let logits: Vec<f32> = row.iter().cycle().take(seq * vocab_size).copied().collect();

        let mut out = TensorMap::new();
        out.insert("logits".into(), Tensor::from_f32(vec![1, seq, vocab_size], logits)?);
        for layer in 0..LAYERS {
            out.insert(format!("present.{layer}.key"), Tensor::zeros(vec![1, 2, seq, 4], DType::F32));
            out.insert(format!("present.{layer}.value"), Tensor::zeros(vec![1, 2, seq, 4], DType::F32));
        }
        Ok(out)
    };

    let mut decoder_output_specs = vec![TensorSpec::new("logits", DType::F32, 3)];
    for layer in 0..LAYERS {
        decoder_output_specs.push(TensorSpec::new(format!("present.{layer}.key"), DType::F32, 4));
        decoder_output_specs.push(TensorSpec::new(format!("present.{layer}.value"), DType::F32, 4));
    }

    let first_targets = target_ids.clone();
    engine.register(
        GraphRole::Decoder,
        vec![
            TensorSpec::new("input_ids", DType::I64, 2),
            TensorSpec::new("encoder_hidden_states", DType::F32, 3),
        ],
        decoder_output_specs.clone(),
        move |inputs| {
            let seq = inputs["input_ids"].shape()[1];
            step_outputs(&first_targets, seq, 0)
        },
    );

    let mut with_past_inputs = vec![
        TensorSpec::new("input_ids", DType::I64, 2),
        TensorSpec::new("encoder_hidden_states", DType::F32, 3),
    ];
    for layer in 0..LAYERS {
        with_past_inputs.push(TensorSpec::new(format!("past_key_values.{layer}.key"), DType::F32, 4));
        with_past_inputs.push(TensorSpec::new(format!("past_key_values.{layer}.value"), DType::F32, 4));
    }

    engine.register(
        GraphRole::DecoderWithPast,
        with_past_inputs,
        decoder_output_specs,
        move |inputs| {
            let past = inputs["past_key_values.0.key"].shape()[KV_SEQ_DIM];
            step_outputs(&target_ids, past + 1, past)
        },
    );

    Arc::new(engine)
}

#[tokio::main]
async fn main() -> konro::Result<()> {
    tracing_subscriber::fmt::init();

    let tokenizer = Arc::new(VocabTokenizer::new(&[SOURCE, TARGET]));
    let target_ids = tokenizer.encode(TARGET)?;
    let vocab_size = tokenizer.vocab.len();

    let config = ModelConfig {
        architecture: Architecture::Seq2Seq,
        task: Task::Translation,
        precision: Precision::F32,
        naming: TensorNaming::default(),
        decoder: Some(DecoderConfig {
            num_layers: LAYERS,
            vocab_size,
            eos_token_id: EOS,
            decoder_start_token_id: 0,
        }),
        diffusion: None,
    };
    let handles: Vec<GraphHandle> = Architecture::Seq2Seq
        .expected_roles()
        .iter()
        .map(|&role| GraphHandle { role, bytes: vec![role as u8] })
        .collect();

    let store = Arc::new(MemoryStore::new());
    save_bundle(store.as_ref(), "demo/marian-en-fr", &config, &handles)?;

    let pipeline = Pipeline::builder(build_engine(target_ids, vocab_size))
        .store(store)
        .tokenizer(tokenizer.clone())
        .build("demo/marian-en-fr")?;

    println!("source: {SOURCE}");
    print!("tokens:");
    let mut stream = pipeline.translate_stream(SOURCE).await?;
    let mut tokens = Vec::new();
    while let Some(token) = stream.next().await {
        let token = token?;
        print!(" {token}");
        tokens.push(token);
    }
    println!();
    println!("translation: {}", tokenizer.decode(&tokens)?);

    Ok(())
}
