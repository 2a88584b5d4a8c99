//! Модуль сборки временной шкалы
//!
//! Раскладывает озвученные субтитры по их стартовым семплам, заполняя
//! промежутки тишиной. Порядок субтитров не меняется, наложения не обрезаются.

use log::{debug, info};

use crate::media::pcm::Pcm;
use crate::subtitle::Cue;

/// Собрать одну дорожку из результатов синтеза.
///
/// `results[i]` соответствует `cues[i]`; `None` означает неудачный синтез,
/// на его месте остается пауза. Если курсор уже ушел дальше старта
/// следующего субтитра, тот ставится вплотную.
pub fn assemble<P: AsRef<[i16]>>(cues: &[Cue], results: &[Option<P>]) -> Pcm {
    let total: usize = results
        .iter()
        .flatten()
        .map(|pcm| pcm.as_ref().len())
        .sum();
    let mut track: Pcm = Vec::with_capacity(total);

    for (index, cue) in cues.iter().enumerate() {
        let target = cue.start_sample();
        if track.len() < target {
            let gap = target - track.len();
            track.resize(target, 0);
            debug!("Cue {}: inserted {} samples of silence", cue.id, gap);
        }

        match results.get(index).and_then(|r| r.as_ref()) {
            Some(pcm) => track.extend_from_slice(pcm.as_ref()),
            None => debug!("Cue {}: no audio, leaving a gap", cue.id),
        }
    }

    info!("Assembled timeline: {} cues, {} samples", cues.len(), track.len());
    track
}
