use std::collections::HashMap;

use candle_core::Device;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::Tokenizer;

use rubric_embed::tokenize_batch;

fn word_tokenizer() -> Tokenizer {
    let vocab: HashMap<String, u32> = [("[PAD]", 0), ("[UNK]", 1), ("fear", 2), ("of", 3), ("the", 4), ("dark", 5)]
        .into_iter()
        .map(|(w, id)| (w.to_string(), id))
        .collect();
    let model = WordLevel::builder().vocab(vocab).unk_token("[UNK]".to_string()).build().unwrap();
    let mut tokenizer = Tokenizer::new(model);
    tokenizer.with_pre_tokenizer(Whitespace::default());
    tokenizer
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn rows_pad_to_the_longest_with_zero_ids_and_mask() {
    let tok = word_tokenizer();
    let (ids, mask) = tokenize_batch(&tok, &texts(&["fear", "fear of the dark", "the dark"]), 8, &Device::Cpu).unwrap();
    assert_eq!(ids.dims(), &[3, 4]);
    assert_eq!(mask.dims(), &[3, 4]);

    let ids: Vec<Vec<u32>> = ids.to_vec2().unwrap();
    let mask: Vec<Vec<u32>> = mask.to_vec2().unwrap();
    assert_eq!(ids, vec![vec![2, 0, 0, 0], vec![2, 3, 4, 5], vec![4, 5, 0, 0]]);
    assert_eq!(mask, vec![vec![1, 0, 0, 0], vec![1, 1, 1, 1], vec![1, 1, 0, 0]]);
}

#[test]
fn long_rows_are_cut_to_max_len() {
    let tok = word_tokenizer();
    let (ids, mask) = tokenize_batch(&tok, &texts(&["fear of the dark", "dark"]), 2, &Device::Cpu).unwrap();
    assert_eq!(ids.dims(), &[2, 2]);
    let ids: Vec<Vec<u32>> = ids.to_vec2().unwrap();
    let mask: Vec<Vec<u32>> = mask.to_vec2().unwrap();
    assert_eq!(ids, vec![vec![2, 3], vec![5, 0]]);
    assert_eq!(mask, vec![vec![1, 1], vec![1, 0]]);
}

#[test]
fn unknown_words_map_to_unk_and_empty_text_is_fully_masked() {
    let tok = word_tokenizer();
    let (ids, mask) = tokenize_batch(&tok, &texts(&["", "fear of spiders"]), 8, &Device::Cpu).unwrap();
    let ids: Vec<Vec<u32>> = ids.to_vec2().unwrap();
    let mask: Vec<Vec<u32>> = mask.to_vec2().unwrap();
    assert_eq!(ids, vec![vec![0, 0, 0], vec![2, 3, 1]]);
    assert_eq!(mask, vec![vec![0, 0, 0], vec![1, 1, 1]]);
}
